//! # Media Handler Library
//!
//! Classification, validation and normalization pipeline for uploaded media
//! files. Given a file path and a detected MIME type, the crate decides the
//! media family, validates the content against configurable quotas, and
//! normalizes it to one of three canonical encodings: progressive JPEG for
//! still images, M4A for audio, MP4 (H.264/AAC) for video and animations.
//!
//! All media inspection and transcoding goes through external tools
//! (`ffprobe`, `ffmpeg`, ImageMagick) driven via the pluggable
//! [`exec::CommandRunner`] capability, so the whole pipeline is testable
//! without the tools installed.
//!
//! ## Module architecture:
//! - `config`: quotas, scratch directory and timeout configuration
//! - `error`: typed rejection and failure errors with per-site codes
//! - `exec`: external command execution capability
//! - `analyzer`: memoized ffprobe/ImageMagick probing
//! - `image_size`: pixel-area quota validation
//! - `handler`: per-family validation and normalization
//! - `converter`: ffmpeg re-encoding with ladders and progress reporting
//! - `progress`: sidecar-file progress protocol for pollers
//! - `media_file`: MIME classification and handler dispatch
//!
//! ## Usage:
//! ```rust,no_run
//! use media_handler::{Config, MediaFile, SystemRunner};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), media_handler::MediaError> {
//! let config = Config::default();
//! let runner = Arc::new(SystemRunner);
//! let media = MediaFile::new("upload.mov", "video/quicktime", &config, runner).await?;
//! media.handle().await?;
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod config;
pub mod converter;
pub mod error;
pub mod exec;
pub mod handler;
pub mod image_size;
pub mod media_file;
pub mod progress;

pub use analyzer::{Analyzer, FfmpegAnalyzer, ImageAnalyzer};
pub use config::Config;
pub use converter::{FfmpegConverter, OutputProfile};
pub use error::MediaError;
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use handler::{Handler, MediaType};
pub use media_file::{MediaFamily, MediaFile};
pub use progress::{ConversionProgress, ProcessingStatus};
