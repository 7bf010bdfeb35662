//! Audio container validation and conversion queueing.

use crate::analyzer::{Analyzer, FfmpegAnalyzer};
use crate::config::Config;
use crate::error::MediaError;
use crate::exec::CommandRunner;
use crate::handler::{Handler, MediaType};
use crate::progress;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Validates an audio file and queues it for conversion to M4A
pub struct AudioHandler {
    path: PathBuf,
    analyzer: FfmpegAnalyzer,
    config: Config,
}

impl AudioHandler {
    pub fn new(
        path: impl Into<PathBuf>,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, MediaError> {
        let path = path.into();
        let analyzer = FfmpegAnalyzer::new(&path, runner)?;
        Ok(Self::with_analyzer(path, analyzer, config))
    }

    /// Adopt an analyzer whose probes already ran during dispatch, so the
    /// memoized answers carry over instead of being re-queried.
    pub fn with_analyzer(
        path: impl Into<PathBuf>,
        analyzer: FfmpegAnalyzer,
        config: &Config,
    ) -> Self {
        Self {
            path: path.into(),
            analyzer,
            config: config.clone(),
        }
    }

    /// Fixed rejection chain shared in shape with the video handler:
    /// corruption, stream presence, then duration sanity and quota.
    async fn validate(&self) -> Result<(), MediaError> {
        if self.analyzer.is_corrupted().await? {
            return Err(MediaError::corrupt(
                "This file contains errors and can't be used.",
                10,
            ));
        }

        if !self.analyzer.has_audio().await? {
            return Err(MediaError::corrupt(
                "The file does not seem to contain any audio",
                2,
            ));
        }

        check_duration(self.analyzer.duration().await?, self.config.max_duration_secs)
    }
}

/// Duration sanity and quota checks shared by the audio and video handlers
pub(crate) fn check_duration(duration: f64, max_secs: u32) -> Result<(), MediaError> {
    if duration < 0.0 {
        return Err(MediaError::corrupt(
            "Media duration is negative? This can't be right...",
            4,
        ));
    }
    if duration == 0.0 {
        return Err(MediaError::corrupt(
            "Cannot determine duration of the media",
            3,
        ));
    }
    if duration > max_secs as f64 {
        return Err(MediaError::too_big(
            format!(
                "Length: {} minutes, max length: {} minutes",
                (duration / 60.0) as u64,
                max_secs / 60
            ),
            4,
        ));
    }
    Ok(())
}

pub(crate) fn basename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Handler for AudioHandler {
    async fn handle(&self) -> Result<(), MediaError> {
        self.validate().await?;

        // An empty sidecar signals "queued" to progress pollers
        progress::mark_queued(&self.config.scratch_dir, &basename_of(&self.path)).await?;
        debug!("Queued audio file '{}' for conversion", self.path.display());
        Ok(())
    }

    fn media_type(&self) -> MediaType {
        MediaType::M4a
    }

    async fn duration(&self) -> Result<i64, MediaError> {
        Ok(self.analyzer.duration().await?.round() as i64)
    }

    async fn has_audio(&self) -> Result<bool, MediaError> {
        Ok(true)
    }

    fn needs_processing(&self) -> bool {
        true
    }

    fn generated_image_path(&self) -> Option<&Path> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::fake::{failed, ok, FakeRunner};
    use crate::progress::{ConversionProgress, ProcessingStatus};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        Config {
            scratch_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    async fn write_source(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, b"audio-bytes").await.unwrap();
        path
    }

    /// Healthy 3-minute audio file
    fn healthy_runner() -> FakeRunner {
        FakeRunner::new()
            .on("select_streams a", ok(br#"{"streams":[{"index":0}]}"#))
            .on("format=duration", ok(b"180.0\n"))
            .on("-xerror", ok(b""))
    }

    #[tokio::test]
    async fn test_accepts_and_queues() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "track.mp3").await;
        let handler =
            AudioHandler::new(&source, &test_config(&dir), Arc::new(healthy_runner())).unwrap();

        handler.handle().await.unwrap();

        let progress = ConversionProgress::new("track.mp3", 180.0, dir.path());
        assert_eq!(progress.status().await.unwrap(), ProcessingStatus::Queued);

        assert_eq!(handler.media_type(), MediaType::M4a);
        assert_eq!(handler.duration().await.unwrap(), 180);
        assert!(handler.has_audio().await.unwrap());
        assert!(handler.needs_processing());
    }

    #[tokio::test]
    async fn test_corrupt_file_rejected_first() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "bad.mp3").await;
        // Decode errors even though a stream is present
        let runner = FakeRunner::new()
            .on("select_streams a", ok(br#"{"streams":[{"index":0}]}"#))
            .on("format=duration", ok(b"180.0\n"))
            .on("-xerror", failed(1, b"Invalid data found"));
        let handler =
            AudioHandler::new(&source, &test_config(&dir), Arc::new(runner)).unwrap();

        match handler.handle().await {
            Err(MediaError::CorruptFile { code, .. }) => assert_eq!(code, 10),
            other => panic!("expected CorruptFile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_audio_stream_rejected() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "silent.mp4").await;
        let runner = FakeRunner::new()
            .on("select_streams a", ok(br#"{"streams":[]}"#))
            .on("-xerror", ok(b""));
        let handler =
            AudioHandler::new(&source, &test_config(&dir), Arc::new(runner)).unwrap();

        match handler.handle().await {
            Err(MediaError::CorruptFile { message, code }) => {
                assert_eq!(code, 2);
                assert_eq!(message, "The file does not seem to contain any audio");
            }
            other => panic!("expected CorruptFile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "empty.mp3").await;
        let runner = FakeRunner::new()
            .on("select_streams a", ok(br#"{"streams":[{"index":0}]}"#))
            .on("format=duration", ok(b"0.0\n"))
            .on("-progress", ok(b""))
            .on("-xerror", ok(b""));
        let handler =
            AudioHandler::new(&source, &test_config(&dir), Arc::new(runner)).unwrap();

        match handler.handle().await {
            Err(MediaError::CorruptFile { code, .. }) => assert_eq!(code, 3),
            other => panic!("expected CorruptFile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overlong_file_rejected_in_minutes() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "long.mp3").await;
        // 20 minutes against the 15 minute default
        let runner = FakeRunner::new()
            .on("select_streams a", ok(br#"{"streams":[{"index":0}]}"#))
            .on("format=duration", ok(b"1200.0\n"))
            .on("-xerror", ok(b""));
        let handler =
            AudioHandler::new(&source, &test_config(&dir), Arc::new(runner)).unwrap();

        match handler.handle().await {
            Err(MediaError::TooBigFile { message, code }) => {
                assert_eq!(code, 4);
                assert_eq!(message, "Length: 20 minutes, max length: 15 minutes");
            }
            other => panic!("expected TooBigFile, got {:?}", other),
        }
    }

    #[test]
    fn test_duration_checks_order() {
        // Negative and zero duration carry distinct codes and messages
        match check_duration(-1.0, 900) {
            Err(MediaError::CorruptFile { message, code }) => {
                assert_eq!(code, 4);
                assert_eq!(message, "Media duration is negative? This can't be right...");
            }
            other => panic!("expected CorruptFile, got {:?}", other),
        }
        match check_duration(0.0, 900) {
            Err(MediaError::CorruptFile { message, code }) => {
                assert_eq!(code, 3);
                assert_eq!(message, "Cannot determine duration of the media");
            }
            other => panic!("expected CorruptFile, got {:?}", other),
        }
        assert!(check_duration(900.0, 900).is_ok());
        assert!(check_duration(901.0, 900).is_err());
    }
}
