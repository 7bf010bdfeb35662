//! # Configuration Management Module
//!
//! Quotas and knobs for media validation and normalization.
//!
//! ## Parameters:
//! - `max_total_pixels`: Pixel area cap for still/animated images (default: 50_000_000)
//! - `max_dimensions`: Square clamp for re-encoded images, shrink only (default: 4096)
//! - `max_frames`: Frame quota for animated images (default: 4000)
//! - `max_duration_secs`: Duration quota for audio/video (default: 900)
//! - `image_quality`: JPEG quality for normalized images (1-100, default: 80)
//! - `scratch_dir`: Where temp outputs and progress sidecar files live (default: system temp dir)
//! - `convert_timeout_secs`: Upper bound on a single transcode run, `None` disables it (default: 600)
//!
//! ## Validation:
//! - `image_quality` must be 1-100
//! - All quotas must be non-zero
//! - `scratch_dir` must exist and be a directory
//!
//! ## Example:
//! ```rust,no_run
//! use media_handler::Config;
//!
//! let config = Config {
//!     max_duration_secs: 300,
//!     image_quality: 85,
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use crate::error::MediaError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for media validation and conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum image pixel area (width * height)
    pub max_total_pixels: u64,
    /// Maximum image edge length after normalization (never upscales)
    pub max_dimensions: u32,
    /// Maximum frame count for animated images
    pub max_frames: u32,
    /// Maximum audio/video duration in seconds
    pub max_duration_secs: u32,
    /// JPEG quality for normalized still images (1-100)
    pub image_quality: u8,
    /// Scratch area for temp outputs and progress sidecar files
    pub scratch_dir: PathBuf,
    /// Time bound on a single transcode run (None = unbounded)
    pub convert_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_total_pixels: 50_000_000,
            max_dimensions: 4096,
            max_frames: 4000,
            max_duration_secs: 900,
            image_quality: 80,
            scratch_dir: std::env::temp_dir(),
            convert_timeout_secs: Some(600),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.image_quality == 0 || self.image_quality > 100 {
            return Err(invalid("Image quality must be between 1 and 100"));
        }

        if self.max_total_pixels == 0 {
            return Err(invalid("Max total pixels must be greater than 0"));
        }

        if self.max_dimensions == 0 {
            return Err(invalid("Max dimensions must be greater than 0"));
        }

        if self.max_frames == 0 {
            return Err(invalid("Max frames must be greater than 0"));
        }

        if self.max_duration_secs == 0 {
            return Err(invalid("Max duration must be greater than 0"));
        }

        if !self.scratch_dir.exists() {
            return Err(invalid(format!(
                "Scratch directory does not exist: {}",
                self.scratch_dir.display()
            )));
        }
        if !self.scratch_dir.is_dir() {
            return Err(invalid(format!(
                "Scratch path is not a directory: {}",
                self.scratch_dir.display()
            )));
        }

        Ok(())
    }

    /// Load configuration from a JSON file, falling back to defaults when absent
    pub async fn from_file(path: &PathBuf) -> Result<Self, MediaError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| invalid(format!("Invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save_to_file(&self, path: &PathBuf) -> Result<(), MediaError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| invalid(format!("Config serialization failed: {e}")))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> MediaError {
    MediaError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        message.into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.image_quality = 0;
        assert!(config.validate().is_err());

        config.image_quality = 101;
        assert!(config.validate().is_err());

        config.image_quality = 80;
        config.max_duration_secs = 0;
        assert!(config.validate().is_err());

        config.max_duration_secs = 900;
        config.scratch_dir = PathBuf::from("/definitely/not/a/real/dir");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_total_pixels, 50_000_000);
        assert_eq!(config.max_dimensions, 4096);
        assert_eq!(config.max_frames, 4000);
        assert_eq!(config.max_duration_secs, 900);
        assert_eq!(config.image_quality, 80);
        assert_eq!(config.convert_timeout_secs, Some(600));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            max_total_pixels: 10_000_000,
            max_dimensions: 2048,
            max_frames: 500,
            max_duration_secs: 300,
            image_quality: 85,
            scratch_dir: temp_dir.path().to_path_buf(),
            convert_timeout_secs: None,
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.max_total_pixels, 10_000_000);
        assert_eq!(loaded_config.max_dimensions, 2048);
        assert_eq!(loaded_config.max_frames, 500);
        assert_eq!(loaded_config.max_duration_secs, 300);
        assert_eq!(loaded_config.image_quality, 85);
        assert_eq!(loaded_config.convert_timeout_secs, None);
    }

    #[tokio::test]
    async fn test_config_missing_file_falls_back_to_default() {
        let config = Config::from_file(&PathBuf::from("/nonexistent/config.json"))
            .await
            .unwrap();
        assert_eq!(config.max_duration_secs, 900);
    }
}
