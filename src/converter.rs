//! # Media Conversion Module
//!
//! Re-encodes validated audio/video files into the canonical MP4 encoding.
//!
//! ## Pipeline:
//! 1. Probe all streams with ffprobe (JSON output)
//! 2. Pick the first video and first audio stream (first is usually the
//!    primary/best one)
//! 3. Check the selection against the requested `OutputProfile` before
//!    spending any encoder time
//! 4. Choose target resolution, encoder preset, audio bitrate, channel count
//!    and sample rate from ladders keyed on the source stream properties
//! 5. Run ffmpeg writing to a scratch temp file, with incremental progress
//!    going to the sidecar file `ConversionProgress` polls
//! 6. Atomically publish the temp file at `{source}.mp4`
//!
//! Cover art embedded as a frame-rate-less video stream gets special
//! treatment: the single frame is extracted to a pipe and re-fed as a
//! fixed-rate one-image slideshow.
//!
//! Failure at any site writes `FAIL` to the sidecar and raises
//! `ConversionFailure` with a site-specific code.

use crate::config::Config;
use crate::error::MediaError;
use crate::exec::{to_string_vec, CommandOutput, CommandRunner};
use crate::progress;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Declarative constraints a conversion's stream selection must satisfy
#[derive(Debug, Clone, Copy)]
pub struct OutputProfile {
    pub format: &'static str,
    pub allow_audio: bool,
    pub require_audio: bool,
    pub allow_video: bool,
    pub require_video: bool,
}

impl OutputProfile {
    /// Audio-only target: audio required, video forbidden
    pub fn audio() -> Self {
        Self {
            format: "mp4",
            allow_audio: true,
            require_audio: true,
            allow_video: false,
            require_video: false,
        }
    }

    /// Video target: video required, audio optional
    pub fn video() -> Self {
        Self {
            format: "mp4",
            allow_audio: true,
            require_audio: false,
            allow_video: true,
            require_video: true,
        }
    }
}

/// One elementary stream as reported by ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub max_bit_rate: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub sample_rate: Option<String>,
}

impl StreamInfo {
    fn is_video(&self) -> bool {
        self.codec_type == "video"
    }

    fn is_audio(&self) -> bool {
        self.codec_type == "audio"
    }

    /// An indeterminate average frame rate marks a static image stream
    /// (cover art), not a playable video.
    fn is_static_image(&self) -> bool {
        self.avg_frame_rate.as_deref() == Some("0/0")
    }

    fn source_bitrate(&self) -> u64 {
        self.max_bit_rate
            .as_deref()
            .or(self.bit_rate.as_deref())
            .and_then(|b| b.parse::<u64>().ok())
            .unwrap_or(0)
    }

    fn source_sample_rate(&self) -> Option<u32> {
        self.sample_rate.as_deref().and_then(|r| r.parse::<u32>().ok())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

/// Target geometry and encoder speed for one resolution tier
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct VideoTier {
    pub width: u32,
    pub height: u32,
    pub preset: &'static str,
}

/// Resolution/preset ladder. Total over all inputs; larger sources always
/// land on an equal or higher tier.
pub(crate) fn select_video_tier(dims: Option<(u32, u32)>) -> VideoTier {
    match dims {
        Some((w, h)) if w > 0 && h > 0 => {
            if w < 640 && h < 360 {
                VideoTier { width: 426, height: 240, preset: "slow" }
            } else if w < 854 && h < 480 {
                VideoTier { width: 640, height: 360, preset: "medium" }
            } else if w < 1280 && h < 720 {
                VideoTier { width: 854, height: 480, preset: "medium" }
            } else if w < 1920 && h < 1080 {
                VideoTier { width: 1280, height: 720, preset: "fast" }
            } else {
                VideoTier { width: 1920, height: 1080, preset: "faster" }
            }
        }
        _ => VideoTier { width: 854, height: 480, preset: "faster" },
    }
}

/// Audio bitrate ladder in bits per second. An already-AAC source gets lower
/// thresholds so compressed audio is never needlessly re-inflated; the 127000
/// cutoff (not 128000) keeps a 127999 source from dropping to 96k.
pub(crate) fn select_audio_bitrate(codec_name: Option<&str>, source_bitrate: u64) -> u32 {
    if source_bitrate == 0 {
        return 192_000;
    }

    if codec_name == Some("aac") {
        if source_bitrate <= 127_000 {
            96_000
        } else if source_bitrate <= 191_000 {
            128_000
        } else {
            192_000
        }
    } else if source_bitrate < 191_000 {
        96_000
    } else if source_bitrate < 255_000 {
        128_000
    } else {
        192_000
    }
}

/// Snap the source sample rate down to the nearest supported tier
pub(crate) fn select_sample_rate(source: Option<u32>) -> u32 {
    match source {
        Some(rate) if rate > 0 => {
            if rate < 9_000 {
                8_000
            } else if rate < 12_000 {
                11_025
            } else if rate < 23_000 {
                22_050
            } else if rate < 45_000 {
                44_100
            } else {
                48_000
            }
        }
        _ => 48_000,
    }
}

/// Collapse to mono only when the source already is mono
pub(crate) fn select_channels(source: Option<u32>) -> u32 {
    if source == Some(1) {
        1
    } else {
        2
    }
}

/// Drives ffmpeg to produce the canonical encoding for one source file
pub struct FfmpegConverter {
    path: PathBuf,
    profile: OutputProfile,
    config: Config,
    runner: Arc<dyn CommandRunner>,
}

impl FfmpegConverter {
    pub fn new(
        path: impl Into<PathBuf>,
        profile: OutputProfile,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            path: path.into(),
            profile,
            config: config.clone(),
            runner,
        }
    }

    /// Convert the source file, returning the destination path on success.
    /// The source file itself is never modified.
    pub async fn convert(&self) -> Result<PathBuf, MediaError> {
        let basename = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = self
            .path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !self.path.is_file() {
            return Err(MediaError::conversion(
                format!("File '{}' does not exist", self.path.display()),
                1,
            ));
        }

        let streams = self.probe_streams(&filename).await?;

        // First stream of each type is the best guess for the primary one
        let mut video_stream = streams.iter().find(|s| s.is_video()).cloned();
        let audio_stream = streams.iter().find(|s| s.is_audio()).cloned();

        // A static cover-art stream came first; prefer a real video stream
        // if the container holds one.
        if let Some(video) = &video_stream {
            if video.is_static_image() {
                if let Some(real) = streams.iter().find(|s| s.is_video() && !s.is_static_image()) {
                    video_stream = Some(real.clone());
                }
            }
        }

        if (self.profile.require_video && video_stream.is_none())
            || (!self.profile.allow_video && video_stream.is_some())
            || (self.profile.require_audio && audio_stream.is_none())
            || (!self.profile.allow_audio && audio_stream.is_some())
        {
            return Err(MediaError::conversion(
                format!("Streams do not match converter requirements in file '{filename}'"),
                4,
            ));
        }

        let sidecar = progress::sidecar_path(&self.config.scratch_dir, &basename);
        progress::clear(&self.config.scratch_dir, &basename).await?;

        let temp = tempfile::Builder::new()
            .prefix("mediahandler-ffmpeg-")
            .tempfile_in(&self.config.scratch_dir)?;
        let temp_path = temp.path().to_path_buf();

        let run = self.run_transcode(
            video_stream.as_ref(),
            audio_stream.as_ref(),
            &sidecar,
            &temp_path,
        );

        let outcome = match self.config.convert_timeout_secs {
            Some(secs) => {
                let bound = std::time::Duration::from_secs(secs);
                match tokio::time::timeout(bound, run).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Conversion of '{}' exceeded {}s", self.path.display(), secs);
                        progress::mark_failed(&self.config.scratch_dir, &basename).await?;
                        return Err(MediaError::conversion(
                            format!("{filename}: Media conversion timed out after {secs}s"),
                            7,
                        ));
                    }
                }
            }
            None => run.await,
        };
        if let Err(e) = outcome {
            progress::mark_failed(&self.config.scratch_dir, &basename).await?;
            return Err(e);
        }

        // A clean run leaves no sidecar; absence reads as DONE
        progress::clear(&self.config.scratch_dir, &basename).await?;

        let empty = tokio::fs::metadata(&temp_path)
            .await
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        if empty {
            progress::mark_failed(&self.config.scratch_dir, &basename).await?;
            return Err(MediaError::conversion(
                format!("{filename}: Media conversion failed, converted file does not exist or is empty"),
                5,
            ));
        }

        let dest = self.destination(&basename);
        match tokio::fs::remove_file(&dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if temp.persist(&dest).is_err() || !dest.is_file() {
            progress::mark_failed(&self.config.scratch_dir, &basename).await?;
            return Err(MediaError::conversion(
                format!("{filename}: Media conversion failed, move after conversion failed"),
                6,
            ));
        }

        debug!("Converted '{}' -> '{}'", self.path.display(), dest.display());
        Ok(dest)
    }

    fn destination(&self, basename: &str) -> PathBuf {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("{basename}.{}", self.profile.format))
    }

    async fn probe_streams(&self, filename: &str) -> Result<Vec<StreamInfo>, MediaError> {
        let args = to_string_vec([
            "-loglevel",
            "warning",
            "-show_streams",
            "-show_format",
            "-of",
            "json",
            &self.path.to_string_lossy(),
        ]);

        let output = self.runner.run("ffprobe", &args).await?;

        let report: ProbeReport = serde_json::from_slice(&output.stdout).map_err(|_| {
            MediaError::conversion(format!("No streams found in file '{filename}'"), 2)
        })?;

        if report.streams.is_empty() {
            return Err(MediaError::conversion(
                format!("No streams found in file '{filename}'"),
                3,
            ));
        }

        Ok(report.streams)
    }

    async fn run_transcode(
        &self,
        video_stream: Option<&StreamInfo>,
        audio_stream: Option<&StreamInfo>,
        sidecar: &Path,
        temp_path: &Path,
    ) -> Result<(), MediaError> {
        let static_image = video_stream.map(|v| v.is_static_image()).unwrap_or(false);

        let mut video_args = match video_stream {
            Some(video) => {
                let tier = select_video_tier(match (video.width, video.height) {
                    (Some(w), Some(h)) => Some((w, h)),
                    _ => None,
                });
                let filter = format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease,\
                     pad=ceil(iw/2)*2:ceil(ih/2)*2,setsar=1",
                    tier.width, tier.height
                );
                debug!(
                    "Video tier for '{}': {}x{} preset {}",
                    self.path.display(),
                    tier.width,
                    tier.height,
                    tier.preset
                );

                to_string_vec([
                    "-c:v",
                    "libx264",
                    "-pix_fmt",
                    "yuv420p",
                    "-crf",
                    "24",
                    "-preset:v",
                    tier.preset,
                    "-profile:v",
                    "high",
                    "-level:v",
                    "5.1",
                    "-filter_complex",
                    &filter,
                    "-vsync",
                    "2",
                    "-r",
                    "60",
                ])
            }
            None => to_string_vec(["-vn"]),
        };

        let audio_args = match audio_stream {
            Some(audio) => {
                let bitrate = select_audio_bitrate(audio.codec_name.as_deref(), audio.source_bitrate());
                let channels = select_channels(audio.channels);
                let sample_rate = select_sample_rate(audio.source_sample_rate());

                to_string_vec([
                    "-c:a",
                    "aac",
                    "-ac",
                    &channels.to_string(),
                    "-ar",
                    &sample_rate.to_string(),
                    "-b:a",
                    &format!("{}k", bitrate / 1000),
                ])
            }
            None => to_string_vec(["-an"]),
        };

        // Output layout shared by both invocation shapes: no subtitles, data
        // streams, metadata or chapters; faststart for streaming playback; a
        // generous muxing queue to tolerate odd timestamps.
        let mut tail = to_string_vec([
            "-sn",
            "-dn",
            "-map_metadata",
            "-1",
            "-map_chapters",
            "-1",
            "-movflags",
            "faststart",
            "-progress",
            &sidecar.to_string_lossy(),
            "-nostats",
        ]);

        if let (true, Some(video)) = (static_image, video_stream) {
            // Single still frame: extract it to a pipe, then feed it back as
            // a fixed-rate slideshow-of-one alongside the original's audio.
            let extract_args = to_string_vec([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                &self.path.to_string_lossy(),
                "-map",
                &format!("0:{}", video.index),
                "-f",
                "image2pipe",
                "-",
            ]);
            let frame = self.runner.run("ffmpeg", &extract_args).await?;
            if !frame.success || frame.stdout.is_empty() {
                return Err(MediaError::conversion(
                    format!(
                        "Could not extract the still frame from '{}'",
                        self.path.display()
                    ),
                    8,
                ));
            }

            let mut args = to_string_vec([
                "-hide_banner",
                "-loglevel",
                "error",
                "-r",
                "60",
                "-i",
                "pipe:",
                "-i",
                &self.path.to_string_lossy(),
            ]);
            args.append(&mut video_args);
            args.extend(audio_args);
            args.append(&mut tail);
            // Video from the pipe (input 0), audio from the original file
            args.extend(to_string_vec(["-map", "0:0"]));
            if let Some(audio) = audio_stream {
                args.extend(to_string_vec(["-map", &format!("1:{}", audio.index)]));
            }
            args.extend(to_string_vec([
                "-max_muxing_queue_size",
                "9999",
                "-f",
                self.profile.format,
                "-y",
                &temp_path.to_string_lossy(),
            ]));

            self.run_ignoring_exit(&args, Some(&frame.stdout)).await?;
        } else {
            let mut args = to_string_vec([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                &self.path.to_string_lossy(),
            ]);
            args.append(&mut video_args);
            args.extend(audio_args);
            args.append(&mut tail);
            if let Some(video) = video_stream {
                args.extend(to_string_vec(["-map", &format!("0:{}", video.index)]));
            }
            if let Some(audio) = audio_stream {
                args.extend(to_string_vec(["-map", &format!("0:{}", audio.index)]));
            }
            args.extend(to_string_vec([
                "-max_muxing_queue_size",
                "9999",
                "-f",
                self.profile.format,
                "-y",
                &temp_path.to_string_lossy(),
            ]));

            self.run_ignoring_exit(&args, None).await?;
        }

        Ok(())
    }

    /// Run ffmpeg; a non-zero exit surfaces later as an empty output file,
    /// matching how callers judge the result.
    async fn run_ignoring_exit(
        &self,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput, MediaError> {
        let output = match stdin {
            Some(bytes) => self.runner.run_with_input("ffmpeg", args, bytes).await?,
            None => self.runner.run("ffmpeg", args).await?,
        };

        if !output.success {
            warn!(
                "ffmpeg exited with {:?} for '{}': {}",
                output.code,
                self.path.display(),
                output.stderr_str().trim()
            );
        }

        Ok(output)
    }
}
