//! Error types for the streamgate core.

use thiserror::Error;

/// Result type alias for streamgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for streamgate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The sink rejected or failed to transmit an audio chunk.
    #[error("sink send failed: {0}")]
    SinkSend(String),

    /// A frame violated a structural invariant (zero sample rate, zero frame
    /// count, empty payload). Fatal to that frame only.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The sink transport could not be started or stopped.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation attempted on a closed session.
    #[error("session closed")]
    Closed,
}

impl Error {
    /// Creates a sink send error.
    pub fn sink_send(msg: impl Into<String>) -> Self {
        Error::SinkSend(msg.into())
    }

    /// Creates an invalid frame error.
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Error::InvalidFrame(msg.into())
    }

    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Returns true if the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SinkSend(_))
    }
}
