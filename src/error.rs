use std::error::Error as StdError;

use thiserror::Error;

/// Parley's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Parley's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
///
/// Variants fall into two groups:
/// - fatal conditions ([`Error::is_fatal`]) that end the session and drive teardown
/// - local conditions the session logs and recovers from
#[derive(Debug, Error)]
pub enum Error {
    /// A capture or render device could not be acquired.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The capture device went away mid-session.
    #[error("capture device lost: {0}")]
    DeviceLost(String),

    /// An utterance with no samples was handed to the encoder.
    #[error("utterance contained no samples")]
    EmptyUtterance,

    /// Captured speech was too short to be worth sending.
    #[error("captured audio too short to send ({samples} samples)")]
    DegenerateCapture { samples: usize },

    /// Any send/receive failure on the duplex channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single queued playback item could not be played.
    #[error("playback item failed: {0}")]
    PlaybackItem(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed or undecodable audio payload.
    #[error("codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Whether this error must end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable(_) | Self::DeviceLost(_) | Self::Transport(_)
        )
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
        Self::Codec(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

#[cfg(feature = "devices")]
impl From<cpal::DevicesError> for Error {
    fn from(err: cpal::DevicesError) -> Self {
        Self::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "devices")]
impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        Self::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "devices")]
impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::DeviceUnavailable(err.to_string())
    }
}

#[cfg(feature = "devices")]
impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::DeviceUnavailable(err.to_string())
    }
}
