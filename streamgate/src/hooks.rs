//! Advisory observability hooks.
//!
//! The gate, buffer, and sender report anomalies (timestamp repairs, dropped
//! frames, exhausted sends) through [`StreamHooks`]. Hooks are advisory only
//! and never alter control flow.

use crate::error::Error;
use crate::timestamp::EpochNanos;

/// Why a capture timestamp was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairReason {
    /// The frame carried no capture timestamp.
    Missing,
    /// The timestamp was ahead of the wall clock beyond tolerance.
    FutureSkew,
    /// The timestamp was behind the wall clock beyond tolerance.
    Stale,
    /// The timestamp regressed behind the accepted watermark.
    OutOfOrder,
}

/// Why a frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The session is stopping and no longer accepts audio.
    Stopping,
    /// The frame failed structural validation.
    Invalid,
}

/// Observability callbacks. All methods default to no-ops.
pub trait StreamHooks: Send + Sync {
    /// A capture timestamp was repaired. `old` is `None` when the frame
    /// carried no timestamp at all.
    fn on_timestamp_repaired(
        &self,
        _reason: RepairReason,
        _old: Option<EpochNanos>,
        _new: EpochNanos,
    ) {
    }

    /// A frame was discarded.
    fn on_frame_dropped(&self, _reason: DropReason) {}

    /// A send attempt failed. Fired once per failed attempt.
    fn on_send_failed(&self, _attempt: u32, _error: &Error) {}
}

/// Hooks implementation that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl StreamHooks for NoopHooks {}
