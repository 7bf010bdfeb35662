//! # Media File Dispatch
//!
//! Maps a detected MIME type to a media family and builds the matching
//! handler. Classification is closed-world: a MIME outside the supported
//! lists is rejected up front with `UnsupportedFileType` instead of being
//! guessed at.

use crate::analyzer::{Analyzer, FfmpegAnalyzer};
use crate::config::Config;
use crate::error::MediaError;
use crate::exec::CommandRunner;
use crate::handler::{
    AnimatedImageHandler, AudioHandler, Handler, MediaType, StillImageHandler, VideoHandler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const STILL_IMAGE_MIMES: &[&str] = &[
    "image/avif",
    "image/heic",
    "image/heif",
    "image/jpeg",
    "image/pjpeg",
    "image/png",
    "image/webp",
];

const ANIMATED_IMAGE_MIMES: &[&str] = &["image/gif"];

const AUDIO_VIDEO_MIMES: &[&str] = &[
    "audio/aac",
    "audio/x-hx-aac-adts",
    "audio/flac",
    "audio/x-matroska",
    "audio/mpeg",
    "audio/mp3",
    "audio/mp4",
    "audio/x-m4a",
    "video/mp4",
    "video/x-m4v",
    "video/quicktime",
    "video/3gpp",
    "video/x-matroska",
    "video/webm",
    "audio/webm",
    "audio/ogg",
    "video/ogg",
    "application/ogg",
];

/// Coarse classification a MIME type resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFamily {
    StillImage,
    AnimatedImage,
    AudioVideo,
}

impl MediaFamily {
    /// `application/octet-stream` gets its own error code: it is the
    /// fallback MIME a content sniffer emits when it recognizes nothing,
    /// which is worth distinguishing from a genuinely foreign type.
    pub fn from_mime(mime: &str) -> Result<Self, MediaError> {
        if STILL_IMAGE_MIMES.contains(&mime) {
            Ok(MediaFamily::StillImage)
        } else if ANIMATED_IMAGE_MIMES.contains(&mime) {
            Ok(MediaFamily::AnimatedImage)
        } else if AUDIO_VIDEO_MIMES.contains(&mime) {
            Ok(MediaFamily::AudioVideo)
        } else if mime == "application/octet-stream" {
            Err(MediaError::UnsupportedFileType {
                mime: mime.to_string(),
                code: 2,
            })
        } else {
            Err(MediaError::UnsupportedFileType {
                mime: mime.to_string(),
                code: 1,
            })
        }
    }
}

/// One media file bound to the handler for its family
pub struct MediaFile {
    path: PathBuf,
    family: MediaFamily,
    handler: Box<dyn Handler>,
}

impl MediaFile {
    pub async fn new(
        path: impl Into<PathBuf>,
        mime: &str,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, MediaError> {
        let path = path.into();
        if !path.is_file() {
            return Err(MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File '{}' does not exist", path.display()),
            )));
        }

        let family = MediaFamily::from_mime(mime)?;
        debug!("'{}' ({}) classified as {:?}", path.display(), mime, family);

        let handler: Box<dyn Handler> = match family {
            MediaFamily::StillImage => {
                Box::new(StillImageHandler::new(&path, config, runner)?)
            }
            MediaFamily::AnimatedImage => {
                Box::new(AnimatedImageHandler::new(&path, config, runner).await?)
            }
            MediaFamily::AudioVideo => {
                // One probe decides the pipeline; the handler adopts the
                // same analyzer so the memoized answer is never re-queried.
                let analyzer = FfmpegAnalyzer::new(&path, Arc::clone(&runner))?;
                if analyzer.has_video().await? {
                    Box::new(VideoHandler::with_analyzer(&path, analyzer, config, runner))
                } else {
                    Box::new(AudioHandler::with_analyzer(&path, analyzer, config))
                }
            }
        };

        Ok(Self { path, family, handler })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn family(&self) -> MediaFamily {
        self.family
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn media_type(&self) -> MediaType {
        self.handler.media_type()
    }

    pub async fn duration(&self) -> Result<i64, MediaError> {
        self.handler.duration().await
    }

    pub async fn has_audio(&self) -> Result<bool, MediaError> {
        self.handler.has_audio().await
    }

    /// Run the family handler's validation and normalization
    pub async fn handle(&self) -> Result<(), MediaError> {
        self.handler.handle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::fake::{ok, FakeRunner};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        Config {
            scratch_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    async fn write_source(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, b"bytes").await.unwrap();
        path
    }

    #[test]
    fn test_family_classification() {
        assert_eq!(
            MediaFamily::from_mime("image/jpeg").unwrap(),
            MediaFamily::StillImage
        );
        assert_eq!(
            MediaFamily::from_mime("image/gif").unwrap(),
            MediaFamily::AnimatedImage
        );
        assert_eq!(
            MediaFamily::from_mime("video/quicktime").unwrap(),
            MediaFamily::AudioVideo
        );
        assert_eq!(
            MediaFamily::from_mime("audio/flac").unwrap(),
            MediaFamily::AudioVideo
        );
    }

    #[test]
    fn test_unknown_mime_rejected() {
        match MediaFamily::from_mime("application/pdf") {
            Err(MediaError::UnsupportedFileType { mime, code }) => {
                assert_eq!(mime, "application/pdf");
                assert_eq!(code, 1);
            }
            other => panic!("expected UnsupportedFileType, got {:?}", other),
        }
    }

    #[test]
    fn test_octet_stream_gets_distinct_code() {
        match MediaFamily::from_mime("application/octet-stream") {
            Err(MediaError::UnsupportedFileType { code, .. }) => assert_eq!(code, 2),
            other => panic!("expected UnsupportedFileType, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file_rejected() {
        let dir = TempDir::new().unwrap();
        let result = MediaFile::new(
            dir.path().join("gone.jpg"),
            "image/jpeg",
            &test_config(&dir),
            Arc::new(FakeRunner::new()),
        )
        .await;
        assert!(matches!(result, Err(MediaError::Io(_))));
    }

    #[tokio::test]
    async fn test_video_bearing_container_uses_video_handler() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4").await;
        let runner = Arc::new(
            FakeRunner::new()
                .on("select_streams v", ok(br#"{"streams":[{"index":0}]}"#))
                .on("select_streams a", ok(br#"{"streams":[{"index":1}]}"#)),
        );
        let media = MediaFile::new(&source, "video/mp4", &test_config(&dir), runner)
            .await
            .unwrap();

        assert_eq!(media.family(), MediaFamily::AudioVideo);
        assert_eq!(media.media_type(), MediaType::Mp4);
        assert!(media.handler().needs_processing());
    }

    #[tokio::test]
    async fn test_audio_only_container_uses_audio_handler() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "track.mp3").await;
        let runner = Arc::new(
            FakeRunner::new()
                .on("select_streams v", ok(br#"{"streams":[]}"#))
                .on("select_streams a", ok(br#"{"streams":[{"index":0}]}"#)),
        );
        let media = MediaFile::new(&source, "audio/mpeg", &test_config(&dir), runner)
            .await
            .unwrap();

        assert_eq!(media.media_type(), MediaType::M4a);
        assert!(media.has_audio().await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_probes_run_once_across_dispatch_and_handle() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4").await;
        let runner = Arc::new(
            FakeRunner::new()
                .on("select_streams v", ok(br#"{"streams":[{"index":0}]}"#))
                .on("select_streams a", ok(br#"{"streams":[{"index":1}]}"#))
                .on("format=duration", ok(b"30.0\n"))
                .on("-xerror", ok(b""))
                .on_with("-vframes", ok(b""), |args| {
                    std::fs::write(args.last().unwrap(), b"jpeg-frame").unwrap();
                }),
        );
        let media = MediaFile::new(
            &source,
            "video/mp4",
            &test_config(&dir),
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
        )
        .await
        .unwrap();
        media.handle().await.unwrap();
        media.has_audio().await.unwrap();
        media.has_audio().await.unwrap();

        // The handler adopts the dispatch analyzer, so the video stream
        // probe that chose the pipeline is never repeated inside handle(),
        // and repeated queries reuse the memoized answer.
        assert_eq!(runner.call_count_matching("-select_streams v"), 1);
        assert_eq!(runner.call_count_matching("-select_streams a"), 1);
    }

    #[tokio::test]
    async fn test_audio_dispatch_reuses_video_probe() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "track.mp3").await;
        let runner = Arc::new(
            FakeRunner::new()
                .on("select_streams v", ok(br#"{"streams":[]}"#))
                .on("select_streams a", ok(br#"{"streams":[{"index":0}]}"#))
                .on("format=duration", ok(b"180.0\n"))
                .on("-xerror", ok(b"")),
        );
        let media = MediaFile::new(
            &source,
            "audio/mpeg",
            &test_config(&dir),
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
        )
        .await
        .unwrap();
        media.handle().await.unwrap();

        assert_eq!(runner.call_count_matching("-select_streams v"), 1);
        assert_eq!(runner.call_count_matching("-select_streams a"), 1);
    }

    #[tokio::test]
    async fn test_still_image_dispatch() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "photo.png").await;
        let media = MediaFile::new(
            &source,
            "image/png",
            &test_config(&dir),
            Arc::new(FakeRunner::new()),
        )
        .await
        .unwrap();

        assert_eq!(media.family(), MediaFamily::StillImage);
        assert_eq!(media.media_type(), MediaType::Jpg);
        assert!(!media.handler().needs_processing());
        assert_eq!(media.duration().await.unwrap(), 0);
    }
}
