//! # Media Analyzer Module
//!
//! Answers yes/no/quantitative questions about a media file: does it carry
//! audio or video streams, how long is it, does it decode cleanly.
//!
//! ## Implementations:
//! - `FfmpegAnalyzer`: general audio/video prober backed by ffprobe/ffmpeg
//! - `ImageAnalyzer`: image-only prober backed by ImageMagick `identify`,
//!   where "duration" is a page/frame-count proxy
//!
//! Every query is memoized for the lifetime of the analyzer instance; the
//! external probe runs at most once per query kind per file. Instances are
//! constructed once per file and never shared across files.
//!
//! Probing failure is deliberately not conflated with corruption: a stream
//! probe that yields no parseable output simply answers "no such stream".
//! Corruption is the stronger, separate check (a full strict decode).

use crate::error::MediaError;
use crate::exec::{to_string_vec, CommandRunner};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Probing questions every media family must answer
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn has_audio(&self) -> Result<bool, MediaError>;

    async fn has_video(&self) -> Result<bool, MediaError>;

    /// Container duration in seconds (page count for image files)
    async fn duration(&self) -> Result<f64, MediaError>;

    async fn is_corrupted(&self) -> Result<bool, MediaError>;
}

#[derive(Debug, Deserialize)]
struct ProbedStreams {
    #[serde(default)]
    streams: Vec<serde_json::Value>,
}

/// Audio/video prober backed by ffprobe and ffmpeg
pub struct FfmpegAnalyzer {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    has_audio: OnceCell<bool>,
    has_video: OnceCell<bool>,
    duration: OnceCell<f64>,
    corrupted: OnceCell<bool>,
}

impl FfmpegAnalyzer {
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Result<Self, MediaError> {
        let path = path.into();
        if !path.is_file() {
            return Err(MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File '{}' does not exist", path.display()),
            )));
        }

        Ok(Self {
            path,
            runner,
            has_audio: OnceCell::new(),
            has_video: OnceCell::new(),
            duration: OnceCell::new(),
            corrupted: OnceCell::new(),
        })
    }

    /// Probe for streams of one type ("a" or "v"). Missing or unparseable
    /// probe output means "no streams of that type", not an error.
    async fn has_stream_of_type(&self, selector: &str) -> Result<bool, MediaError> {
        let args = to_string_vec([
            "-i",
            &self.path.to_string_lossy(),
            "-show_streams",
            "-select_streams",
            selector,
            "-of",
            "json",
            "-v",
            "quiet",
        ]);

        let output = self.runner.run("ffprobe", &args).await?;

        match serde_json::from_slice::<ProbedStreams>(&output.stdout) {
            Ok(info) => Ok(!info.streams.is_empty()),
            Err(e) => {
                debug!(
                    "Stream probe for '{}' ({}) produced no parseable output: {}",
                    self.path.display(),
                    selector,
                    e
                );
                Ok(false)
            }
        }
    }

    async fn probe_duration(&self) -> Result<f64, MediaError> {
        let args = to_string_vec([
            "-i",
            &self.path.to_string_lossy(),
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
            "-v",
            "quiet",
        ]);

        let output = self.runner.run("ffprobe", &args).await?;
        let mut duration = output
            .stdout_str()
            .trim()
            .parse::<f64>()
            .unwrap_or(0.0);

        if duration == 0.0 {
            // Probably corrupted headers; decode the whole file and read the
            // last processed-time marker ffmpeg emitted.
            debug!(
                "Container duration of '{}' is 0, running full-decode fallback",
                self.path.display()
            );

            let args = to_string_vec([
                "-hide_banner",
                "-v",
                "quiet",
                "-i",
                &self.path.to_string_lossy(),
                "-progress",
                "-",
                "-f",
                "null",
                "-",
            ]);

            let output = self.runner.run("ffmpeg", &args).await?;
            let micros = last_out_time_us(&output.stdout_str()).unwrap_or(0);
            if micros != 0 {
                duration = micros as f64 / 1_000_000.0;
            }
        }

        Ok(duration)
    }
}

#[async_trait]
impl Analyzer for FfmpegAnalyzer {
    async fn has_audio(&self) -> Result<bool, MediaError> {
        self.has_audio
            .get_or_try_init(|| self.has_stream_of_type("a"))
            .await
            .copied()
    }

    async fn has_video(&self) -> Result<bool, MediaError> {
        self.has_video
            .get_or_try_init(|| self.has_stream_of_type("v"))
            .await
            .copied()
    }

    async fn duration(&self) -> Result<f64, MediaError> {
        self.duration
            .get_or_try_init(|| self.probe_duration())
            .await
            .copied()
    }

    async fn is_corrupted(&self) -> Result<bool, MediaError> {
        self.corrupted
            .get_or_try_init(|| async {
                // Strict decode against a null sink; any decode error aborts
                // with a non-zero exit.
                let args = to_string_vec([
                    "-v",
                    "error",
                    "-xerror",
                    "-i",
                    &self.path.to_string_lossy(),
                    "-f",
                    "null",
                    "-",
                ]);

                let output = self.runner.run("ffmpeg", &args).await?;
                Ok::<_, MediaError>(!output.success)
            })
            .await
            .copied()
    }
}

/// Last `out_time_us=<integer>` marker in ffmpeg progress output
pub(crate) fn last_out_time_us(progress: &str) -> Option<i64> {
    progress
        .lines()
        .rev()
        .find_map(|line| line.split("out_time_us=").nth(1))
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_digit() || *c == '-')
                .collect::<String>()
        })
        .and_then(|digits| digits.parse::<i64>().ok())
}

/// Image prober backed by ImageMagick `identify`
///
/// `identify` prints one line per page/frame, so the line count doubles as a
/// frame-count "duration". More than one page means the image is animated.
pub struct ImageAnalyzer {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    /// (page count, stderr line count), both from the same identify run
    identify: OnceCell<(usize, usize)>,
}

impl ImageAnalyzer {
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Result<Self, MediaError> {
        let path = path.into();
        if !path.is_file() {
            return Err(MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File '{}' does not exist", path.display()),
            )));
        }

        Ok(Self {
            path,
            runner,
            identify: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn identify(&self) -> Result<(usize, usize), MediaError> {
        self.identify
            .get_or_try_init(|| async {
                let args = to_string_vec([self.path.to_string_lossy().as_ref()]);
                let output = self.runner.run("identify", &args).await?;

                let pages = output.stdout_str().lines().filter(|l| !l.trim().is_empty()).count();
                let errors = output.stderr_str().lines().filter(|l| !l.trim().is_empty()).count();
                debug!(
                    "identify '{}': {} page(s), {} error line(s)",
                    self.path.display(),
                    pages,
                    errors
                );

                Ok::<_, MediaError>((pages, errors))
            })
            .await
            .copied()
    }
}

#[async_trait]
impl Analyzer for ImageAnalyzer {
    async fn has_audio(&self) -> Result<bool, MediaError> {
        Ok(false)
    }

    async fn has_video(&self) -> Result<bool, MediaError> {
        Ok(self.duration().await? > 1.0)
    }

    async fn duration(&self) -> Result<f64, MediaError> {
        let (pages, _) = self.identify().await?;
        Ok(pages as f64)
    }

    async fn is_corrupted(&self) -> Result<bool, MediaError> {
        let (pages, errors) = self.identify().await?;
        Ok(pages == 0 || errors != 0)
    }
}
