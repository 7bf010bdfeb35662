//! # Error Types Module
//!
//! Tagged failure kinds for the whole validation/conversion pipeline.
//!
//! Every rejection site carries a distinct numeric code so that an upload
//! front-end can log exactly where a file fell over without parsing the
//! human-readable message. The messages themselves are safe to show to the
//! submitter after localization.

/// Failure kinds raised by analyzers, handlers and converters
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    /// Classification produced no recognized handler mapping.
    #[error("Unsupported file type: {mime}")]
    UnsupportedFileType { mime: String, code: u8 },

    /// Probing indicates unusable media: decode errors, missing required
    /// stream, non-positive duration, unreadable dimensions.
    #[error("{message}")]
    CorruptFile { message: String, code: u8 },

    /// A configured quota was exceeded (pixel area, duration, frame count).
    #[error("{message}")]
    TooBigFile { message: String, code: u8 },

    /// An external transcode or thumbnail step failed. The validated source
    /// file is left intact; only the canonical artifact is missing.
    #[error("{message}")]
    ConversionFailure { message: String, code: u8 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn corrupt(message: impl Into<String>, code: u8) -> Self {
        Self::CorruptFile { message: message.into(), code }
    }

    pub fn too_big(message: impl Into<String>, code: u8) -> Self {
        Self::TooBigFile { message: message.into(), code }
    }

    pub fn conversion(message: impl Into<String>, code: u8) -> Self {
        Self::ConversionFailure { message: message.into(), code }
    }

    /// The per-site diagnostic code, if this kind carries one.
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::UnsupportedFileType { code, .. }
            | Self::CorruptFile { code, .. }
            | Self::TooBigFile { code, .. }
            | Self::ConversionFailure { code, .. } => Some(*code),
            Self::Io(_) => None,
        }
    }
}
