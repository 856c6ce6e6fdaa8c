//! Audio sink capability.

use async_trait::async_trait;

use crate::error::Result;

/// Downstream capability the gate drives: a remote streaming-recognition
/// connection that accepts raw audio bytes.
///
/// `send_audio_frame` failures are treated as transient and retried by the
/// sender. `start`/`stop` control the underlying transport lifecycle; the
/// transport's own open/close/error callbacks are expected to be marshaled
/// back into the gate as events.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Sends one audio chunk downstream.
    async fn send_audio_frame(&self, audio: &[u8]) -> Result<()>;

    /// Returns true if the underlying transport is currently running.
    fn is_running(&self) -> bool;

    /// Starts the underlying transport.
    async fn start(&self) -> Result<()>;

    /// Stops the underlying transport.
    async fn stop(&self) -> Result<()>;
}
