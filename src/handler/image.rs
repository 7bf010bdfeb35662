//! Still image validation and in-place JPEG normalization.

use crate::analyzer::{Analyzer, ImageAnalyzer};
use crate::config::Config;
use crate::error::MediaError;
use crate::exec::{to_string_vec, CommandRunner};
use crate::handler::{Handler, MediaType};
use crate::image_size::ImageSizeValidator;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Validates a still image and re-encodes it as a flattened, resized,
/// progressive JPEG over the original path.
pub struct StillImageHandler {
    path: PathBuf,
    analyzer: ImageAnalyzer,
    config: Config,
    runner: Arc<dyn CommandRunner>,
}

impl StillImageHandler {
    pub fn new(
        path: impl Into<PathBuf>,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, MediaError> {
        let path = path.into();
        Ok(Self {
            analyzer: ImageAnalyzer::new(&path, Arc::clone(&runner))?,
            path,
            config: config.clone(),
            runner,
        })
    }

    /// Re-encode the first frame to JPEG into a temp file next to the
    /// source, then rename it over the source. Idempotent on its own output.
    async fn normalize(&self) -> Result<(), MediaError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let temp = tempfile::Builder::new()
            .prefix("mediahandler-image-")
            .tempfile_in(dir)?;

        let frame = format!("{}[0]", self.path.display());
        let max = self.config.max_dimensions;
        let args = to_string_vec([
            // Bound ImageMagick's appetite; decompression bombs are a real
            // hazard on uploaded images.
            "-limit",
            "area",
            "512MiB",
            "-limit",
            "memory",
            "128MiB",
            "-limit",
            "map",
            "256MiB",
            "-limit",
            "disk",
            "1GiB",
            "-limit",
            "time",
            "60",
            &frame,
            "+repage",
            "-filter",
            "triangle",
            "-resize",
            &format!("{max}x{max}>"),
            "-auto-orient",
            "-quality",
            &self.config.image_quality.to_string(),
            "-strip",
            "-background",
            "white",
            "-alpha",
            "remove",
            "-flatten",
            "-interlace",
            "plane",
            &format!("jpg:{}", temp.path().display()),
        ]);

        self.runner.run("convert", &args).await?;

        let empty = tokio::fs::metadata(temp.path())
            .await
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        if empty {
            return Err(MediaError::conversion(
                format!(
                    "{}: Image conversion failed, converted file does not exist or is empty",
                    self.path.display()
                ),
                5,
            ));
        }

        temp.persist(&self.path)
            .map_err(|e| MediaError::Io(e.error))?;
        debug!("Normalized image '{}'", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl Handler for StillImageHandler {
    async fn handle(&self) -> Result<(), MediaError> {
        if self.analyzer.is_corrupted().await? {
            return Err(MediaError::corrupt(
                "This file contains errors and can't be used.",
                10,
            ));
        }

        ImageSizeValidator::new(
            &self.path,
            self.config.max_total_pixels,
            Arc::clone(&self.runner),
        )
        .validate()
        .await?;

        self.normalize().await
    }

    fn media_type(&self) -> MediaType {
        MediaType::Jpg
    }

    async fn duration(&self) -> Result<i64, MediaError> {
        Ok(0)
    }

    async fn has_audio(&self) -> Result<bool, MediaError> {
        Ok(false)
    }

    fn needs_processing(&self) -> bool {
        false
    }

    fn generated_image_path(&self) -> Option<&Path> {
        None
    }
}
