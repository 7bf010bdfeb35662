//! # Media Handler Family
//!
//! One handler per media family, each owning validation and normalization
//! for its kind of file:
//! - [`StillImageHandler`]: validates and re-encodes still images to JPEG
//!   in place, synchronously
//! - [`AnimatedImageHandler`]: classifies a GIF as animated or static at
//!   construction and delegates to the matching handler
//! - [`AudioHandler`] / [`VideoHandler`]: validate the container and queue
//!   the file for asynchronous conversion
//!
//! `handle()` runs the full validation chain and either normalizes/queues
//! the file or rejects it with a typed `MediaError`. A rejected handler is
//! not retried; callers build a fresh one if they want to try again.

pub mod animated;
pub mod audio;
pub mod image;
pub mod video;

pub use animated::AnimatedImageHandler;
pub use audio::AudioHandler;
pub use image::StillImageHandler;
pub use video::VideoHandler;

use crate::error::MediaError;
use async_trait::async_trait;
use std::path::Path;

/// Container type a handled file ends up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpg,
    M4a,
    Mp4,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Jpg => "jpg",
            MediaType::M4a => "m4a",
            MediaType::Mp4 => "mp4",
        }
    }

    /// File extension for the normalized file, without the dot
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation and normalization for one media file
#[async_trait]
pub trait Handler: Send + Sync {
    /// Validate the file and normalize or queue it. Errors carry the
    /// rejection reason and a site-specific code.
    async fn handle(&self) -> Result<(), MediaError>;

    /// Container type the file will have after processing
    fn media_type(&self) -> MediaType;

    /// Playback duration in whole seconds (0 for still images)
    async fn duration(&self) -> Result<i64, MediaError>;

    async fn has_audio(&self) -> Result<bool, MediaError>;

    /// Whether a background conversion step follows `handle()`
    fn needs_processing(&self) -> bool;

    /// Path of the separately generated preview image, when the handler
    /// produces one
    fn generated_image_path(&self) -> Option<&Path>;
}
