//! Animated image handling: a GIF is either a video in disguise or a still.

use crate::analyzer::{Analyzer, ImageAnalyzer};
use crate::config::Config;
use crate::error::MediaError;
use crate::exec::CommandRunner;
use crate::handler::{Handler, MediaType, StillImageHandler, VideoHandler};
use crate::image_size::ImageSizeValidator;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Routes an animated-image upload to the video pipeline when it actually
/// animates, and to the still-image pipeline when it is a single frame.
/// The choice is made once, at construction.
pub struct AnimatedImageHandler {
    path: PathBuf,
    analyzer: ImageAnalyzer,
    config: Config,
    runner: Arc<dyn CommandRunner>,
    delegate: Box<dyn Handler>,
}

impl AnimatedImageHandler {
    pub async fn new(
        path: impl Into<PathBuf>,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, MediaError> {
        let path = path.into();
        let analyzer = ImageAnalyzer::new(&path, Arc::clone(&runner))?;

        let delegate: Box<dyn Handler> = if analyzer.has_video().await? {
            debug!("'{}' animates, using the video pipeline", path.display());
            Box::new(VideoHandler::new(&path, config, Arc::clone(&runner))?)
        } else {
            debug!("'{}' is a single frame, using the image pipeline", path.display());
            Box::new(StillImageHandler::new(&path, config, Arc::clone(&runner))?)
        };

        Ok(Self {
            path,
            analyzer,
            config: config.clone(),
            runner,
            delegate,
        })
    }
}

#[async_trait]
impl Handler for AnimatedImageHandler {
    async fn handle(&self) -> Result<(), MediaError> {
        let frames = self.analyzer.duration().await?;
        if frames > self.config.max_frames as f64 {
            return Err(MediaError::too_big("Too many frames in an animated image", 1));
        }

        ImageSizeValidator::new(
            &self.path,
            self.config.max_total_pixels,
            Arc::clone(&self.runner),
        )
        .validate()
        .await?;

        self.delegate.handle().await
    }

    fn media_type(&self) -> MediaType {
        self.delegate.media_type()
    }

    async fn duration(&self) -> Result<i64, MediaError> {
        self.delegate.duration().await
    }

    async fn has_audio(&self) -> Result<bool, MediaError> {
        self.delegate.has_audio().await
    }

    fn needs_processing(&self) -> bool {
        self.delegate.needs_processing()
    }

    fn generated_image_path(&self) -> Option<&Path> {
        self.delegate.generated_image_path()
    }
}
