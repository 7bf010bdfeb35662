//! # Image Size Validation Module
//!
//! Enforces the pixel-area quota before any image is re-encoded. Dimensions
//! come from a primary `magick identify` probe with a plain `identify`
//! fallback, since the primary reports zero dimensions for some of the newer
//! formats (AVIF at least).

use crate::error::MediaError;
use crate::exec::{to_string_vec, CommandRunner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Validates width * height against a configured maximum
pub struct ImageSizeValidator {
    path: PathBuf,
    max_total_pixels: u64,
    runner: Arc<dyn CommandRunner>,
}

impl ImageSizeValidator {
    pub fn new(path: impl Into<PathBuf>, max_total_pixels: u64, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            path: path.into(),
            max_total_pixels,
            runner,
        }
    }

    /// Probe dimensions and reject images whose pixel area exceeds the quota
    pub async fn validate(&self) -> Result<(), MediaError> {
        let (mut width, mut height) = self.probe_dimensions("magick").await.unwrap_or((0, 0));

        if width == 0 || height == 0 {
            // The secondary geometry probe handles formats the primary cannot.
            debug!(
                "Primary dimension probe failed for '{}', trying fallback",
                self.path.display()
            );

            (width, height) = self
                .probe_dimensions("identify")
                .await
                .map_err(|_| MediaError::corrupt("Could not get image dimensions", 3))?;

            if width == 0 || height == 0 {
                return Err(MediaError::corrupt("Could not get image dimensions", 2));
            }
        }

        let pixels = width as u64 * height as u64;
        if pixels > self.max_total_pixels {
            return Err(MediaError::too_big(
                format!(
                    "Image dimensions exceed the maximum image size ({} > {} pixels)",
                    pixels, self.max_total_pixels
                ),
                3,
            ));
        }

        Ok(())
    }

    /// Run one geometry probe; first frame only so animations report the
    /// canvas size, not a page list.
    async fn probe_dimensions(&self, tool: &str) -> Result<(u32, u32), MediaError> {
        let frame = format!("{}[0]", self.path.to_string_lossy());
        let args = if tool == "magick" {
            to_string_vec(["identify", "-format", "%w %h", &frame])
        } else {
            to_string_vec(["-format", "%w %h", &frame])
        };

        let output = self.runner.run(tool, &args).await?;
        if !output.success {
            return Err(MediaError::corrupt("Could not get image dimensions", 3));
        }

        let text = output.stdout_str();
        let mut parts = text.split_whitespace();
        let width = parts.next().and_then(|w| w.parse::<u32>().ok()).unwrap_or(0);
        let height = parts.next().and_then(|h| h.parse::<u32>().ok()).unwrap_or(0);

        Ok((width, height))
    }
}
