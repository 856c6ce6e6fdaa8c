//! Real-time audio timestamp synchronization and buffering core for
//! streaming speech recognition.
//!
//! `streamgate` sits between a live microphone stream and a remote streaming
//! speech-recognition connection. It validates and repairs capture timestamps
//! that may be missing, stale, clock-skewed, or out of order, buffers audio
//! in a bounded time-ordered window while the remote connection is not yet
//! ready or the user is not speaking, and replays buffered audio at its
//! original cadence once the connection opens.
//!
//! - [`TimestampPolicy`]: validates and repairs capture timestamps
//! - [`TimeOrderedBuffer`]: bounded, time-ordered frame buffer with windowed
//!   eviction
//! - [`PacedSender`]: paced replay and live sends with bounded retry
//! - [`StreamGate`]: the per-session state machine routing frames by speech
//!   activity and connection lifecycle
//!
//! The downstream connection is abstracted behind the [`AudioSink`]
//! capability; anomalies are reported through the advisory [`StreamHooks`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamgate::{AudioFrame, AudioSink, GateConfig, StreamGate};
//!
//! # async fn run(sink: Arc<dyn AudioSink>) {
//! let gate = StreamGate::new(sink, GateConfig::default());
//!
//! // Delivered serially by the capture pipeline:
//! gate.on_speech_start(false).await;
//! gate.on_frame(AudioFrame::new(vec![0u8; 640], None, 16_000, 1, 320)).await;
//!
//! // Delivered by the connection callbacks; buffered audio is replayed
//! // at its original cadence in the background:
//! gate.on_connection_open().await;
//! # }
//! ```

mod buffer;
mod config;
mod error;
mod frame;
mod gate;
mod hooks;
mod policy;
mod sender;
mod sink;
mod timestamp;

pub use buffer::TimeOrderedBuffer;
pub use config::GateConfig;
pub use error::{Error, Result};
pub use frame::{AudioFrame, TimestampedFrame};
pub use gate::{GateEvent, StreamGate};
pub use hooks::{DropReason, NoopHooks, RepairReason, StreamHooks};
pub use policy::TimestampPolicy;
pub use sender::PacedSender;
pub use sink::AudioSink;
pub use timestamp::EpochNanos;
