//! Video container validation, thumbnail extraction, conversion queueing.

use crate::analyzer::{Analyzer, FfmpegAnalyzer};
use crate::config::Config;
use crate::error::MediaError;
use crate::exec::{to_string_vec, CommandRunner};
use crate::handler::audio::{basename_of, check_duration};
use crate::handler::{Handler, MediaType};
use crate::progress;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Validates a video file, extracts a first-frame thumbnail and queues the
/// file for conversion to MP4
pub struct VideoHandler {
    path: PathBuf,
    thumbnail_path: PathBuf,
    analyzer: FfmpegAnalyzer,
    config: Config,
    runner: Arc<dyn CommandRunner>,
}

impl VideoHandler {
    pub fn new(
        path: impl Into<PathBuf>,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, MediaError> {
        let path = path.into();
        let analyzer = FfmpegAnalyzer::new(&path, Arc::clone(&runner))?;
        Ok(Self::with_analyzer(path, analyzer, config, runner))
    }

    /// Adopt an analyzer whose probes already ran during dispatch, so the
    /// memoized answers carry over instead of being re-queried.
    pub fn with_analyzer(
        path: impl Into<PathBuf>,
        analyzer: FfmpegAnalyzer,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let path = path.into();
        let mut thumbnail = path.as_os_str().to_owned();
        thumbnail.push(".jpg");
        Self {
            analyzer,
            thumbnail_path: PathBuf::from(thumbnail),
            path,
            config: config.clone(),
            runner,
        }
    }

    async fn validate(&self) -> Result<(), MediaError> {
        if self.analyzer.is_corrupted().await? {
            return Err(MediaError::corrupt(
                "This file contains errors and can't be used.",
                10,
            ));
        }

        if !self.analyzer.has_video().await? {
            return Err(MediaError::corrupt(
                "The file does not seem to contain any video",
                2,
            ));
        }

        check_duration(self.analyzer.duration().await?, self.config.max_duration_secs)
    }

    /// Grab the first frame as a JPEG next to the source file
    async fn generate_thumbnail(&self) -> Result<(), MediaError> {
        let args = to_string_vec([
            "-i",
            &self.path.to_string_lossy(),
            "-vframes",
            "1",
            "-f",
            "image2",
            &self.thumbnail_path.to_string_lossy(),
        ]);
        self.runner.run("ffmpeg", &args).await?;

        let empty = tokio::fs::metadata(&self.thumbnail_path)
            .await
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        if empty {
            // Do not leave a zero-byte artifact behind
            match tokio::fs::remove_file(&self.thumbnail_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Err(MediaError::conversion(
                "Generating a video thumbnail failed",
                5,
            ));
        }

        debug!(
            "Thumbnail for '{}' written to '{}'",
            self.path.display(),
            self.thumbnail_path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl Handler for VideoHandler {
    async fn handle(&self) -> Result<(), MediaError> {
        self.validate().await?;
        self.generate_thumbnail().await?;

        progress::mark_queued(&self.config.scratch_dir, &basename_of(&self.path)).await?;
        debug!("Queued video file '{}' for conversion", self.path.display());
        Ok(())
    }

    fn media_type(&self) -> MediaType {
        MediaType::Mp4
    }

    async fn duration(&self) -> Result<i64, MediaError> {
        Ok(self.analyzer.duration().await?.round() as i64)
    }

    async fn has_audio(&self) -> Result<bool, MediaError> {
        self.analyzer.has_audio().await
    }

    fn needs_processing(&self) -> bool {
        true
    }

    fn generated_image_path(&self) -> Option<&Path> {
        Some(&self.thumbnail_path)
    }
}
