use std::error::Error as StdError;

use thiserror::Error;

use crate::line::LineId;

/// Skitvoice's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Skitvoice's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// Input is not ready for generation (missing line, blank text, unknown speaker, blank voice fields).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A generation is already in flight for this line.
    #[error("line {0} already has a generation in flight")]
    Pending(LineId),

    /// The TTS collaborator rejected or failed the request.
    #[error("voice generation failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Collaborator {
        status: Option<u16>,
        message: String,
    },

    /// A stored payload could not be decoded into PCM.
    #[error("failed to decode audio for line {position} ({line}): {message}")]
    Decode {
        line: LineId,
        position: usize,
        message: String,
    },

    /// A decoded clip does not share the first clip's sample rate or channel count.
    #[error(
        "line {position} is {found_rate} Hz / {found_channels} ch, expected {expected_rate} Hz / {expected_channels} ch"
    )]
    FormatMismatch {
        position: usize,
        expected_rate: u32,
        expected_channels: usize,
        found_rate: u32,
        found_channels: usize,
    },

    /// No line has generated audio yet.
    #[error("nothing to export: generate some voice lines first")]
    NothingToExport,

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn collaborator(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
