//! # Conversion Progress Module
//!
//! Out-of-band progress channel between a running transcode and a polling
//! caller, carried over a sidecar file in the scratch directory.
//!
//! ## Wire format, path `{scratch}/mediahandler-progress-{basename}.txt`:
//! - file absent        => DONE (or never started; the two are indistinguishable)
//! - empty file         => QUEUED
//! - literal `FAIL`     => FAILED
//! - anything else      => PROCESSING; the last `out_time_us=<int>` line is
//!   the transcoder's elapsed time in microseconds
//!
//! The reader is a pure projection: nothing is cached, every poll re-reads
//! the file. Writer side: the handlers create the file empty on acceptance,
//! the converter points ffmpeg's `-progress` output at it, deletes it on
//! clean completion and writes `FAIL` on any failure site.
//!
//! There is no locking. Conversions of two files sharing a basename must not
//! run at the same time.

use crate::analyzer::last_out_time_us;
use crate::error::MediaError;
use std::path::{Path, PathBuf};

/// Coarse state of a background conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Failed,
    Processing,
    Queued,
    Done,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Processing => "processing",
            Self::Queued => "queued",
            Self::Done => "done",
        }
    }
}

/// Sidecar file path for a given source basename
pub fn sidecar_path(scratch_dir: &Path, basename: &str) -> PathBuf {
    scratch_dir.join(format!("mediahandler-progress-{basename}.txt"))
}

/// Mark a conversion as queued: an empty sidecar file
pub(crate) async fn mark_queued(scratch_dir: &Path, basename: &str) -> Result<(), MediaError> {
    tokio::fs::write(sidecar_path(scratch_dir, basename), b"").await?;
    Ok(())
}

/// Mark a conversion as failed
pub(crate) async fn mark_failed(scratch_dir: &Path, basename: &str) -> Result<(), MediaError> {
    tokio::fs::write(sidecar_path(scratch_dir, basename), b"FAIL").await?;
    Ok(())
}

/// Remove the sidecar file; absence is fine
pub(crate) async fn clear(scratch_dir: &Path, basename: &str) -> Result<(), MediaError> {
    match tokio::fs::remove_file(sidecar_path(scratch_dir, basename)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Read-time projection of a background conversion's progress
pub struct ConversionProgress {
    progress_file: PathBuf,
    total_duration_secs: f64,
}

impl ConversionProgress {
    /// `basename` is the source file's name including extension; `total`
    /// the duration the handler reported at validation time.
    pub fn new(basename: &str, total_duration_secs: f64, scratch_dir: &Path) -> Self {
        Self {
            progress_file: sidecar_path(scratch_dir, basename),
            total_duration_secs,
        }
    }

    pub async fn status(&self) -> Result<ProcessingStatus, MediaError> {
        let content = match tokio::fs::read_to_string(&self.progress_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProcessingStatus::Done)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match content.as_str() {
            "" => ProcessingStatus::Queued,
            "FAIL" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Processing,
        })
    }

    /// Percent complete, clamped to 0..=100. Only meaningful while the
    /// status is `Processing`.
    pub async fn progress(&self) -> Result<u8, MediaError> {
        let content = tokio::fs::read_to_string(&self.progress_file).await?;

        let elapsed_secs = match last_out_time_us(&content) {
            Some(micros) => (micros as f64 / 1_000_000.0).round(),
            None => return Ok(0),
        };

        if self.total_duration_secs <= 0.0 {
            return Ok(0);
        }

        let percent = (elapsed_secs / self.total_duration_secs * 100.0).round();
        Ok(percent.clamp(0.0, 100.0) as u8)
    }
}
