//! Audio frame types.

use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::hooks::StreamHooks;
use crate::policy::TimestampPolicy;
use crate::timestamp::EpochNanos;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Raw PCM audio chunk as delivered by the capture pipeline.
///
/// The capture timestamp may be absent or unreliable; it is validated and
/// repaired when the frame enters the core.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw PCM payload.
    pub audio: Bytes,
    /// Capture timestamp, if the pipeline provided one.
    pub pts: Option<EpochNanos>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
    /// Number of samples per channel in this chunk.
    pub frame_count: u32,
}

impl AudioFrame {
    /// Creates a new raw audio frame.
    pub fn new(
        audio: impl Into<Bytes>,
        pts: Option<EpochNanos>,
        sample_rate: u32,
        channels: u16,
        frame_count: u32,
    ) -> Self {
        Self {
            audio: audio.into(),
            pts,
            sample_rate,
            channels,
            frame_count,
        }
    }
}

/// Validated audio frame with a repaired, always-present capture timestamp.
///
/// Immutable after validation. Ownership moves between the buffer and the
/// sender on dequeue; frames are never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedFrame {
    audio: Bytes,
    pts: EpochNanos,
    sample_rate: u32,
    channels: u16,
    frame_count: u32,
}

fn check_shape(sample_rate: u32, frame_count: u32, audio: &[u8]) -> Result<()> {
    if sample_rate == 0 {
        return Err(Error::invalid_frame("zero sample rate"));
    }
    if frame_count == 0 {
        return Err(Error::invalid_frame("zero frame count"));
    }
    if audio.is_empty() {
        return Err(Error::invalid_frame("empty payload"));
    }
    Ok(())
}

impl TimestampedFrame {
    /// Creates a validated frame from already-stamped parts. The timestamp is
    /// taken as-is; the buffer re-validates it on insertion.
    pub fn new(
        audio: impl Into<Bytes>,
        pts: EpochNanos,
        sample_rate: u32,
        channels: u16,
        frame_count: u32,
    ) -> Result<Self> {
        let audio = audio.into();
        check_shape(sample_rate, frame_count, &audio)?;
        Ok(Self {
            audio,
            pts,
            sample_rate,
            channels,
            frame_count,
        })
    }

    /// Builds a validated frame from a raw frame, repairing its timestamp
    /// against the given watermark.
    ///
    /// Fails only on structural violations; timestamp anomalies are repaired,
    /// not rejected.
    pub fn from_raw(
        frame: AudioFrame,
        last_pts: Option<EpochNanos>,
        policy: &TimestampPolicy,
        hooks: &dyn StreamHooks,
    ) -> Result<Self> {
        check_shape(frame.sample_rate, frame.frame_count, &frame.audio)?;
        let pts = policy.validate(frame.pts, last_pts, EpochNanos::now(), hooks);
        Ok(Self {
            audio: frame.audio,
            pts,
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            frame_count: frame.frame_count,
        })
    }

    /// Returns the raw payload bytes.
    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    /// Consumes the frame, returning the payload.
    pub fn into_audio(self) -> Bytes {
        self.audio
    }

    /// Returns the capture timestamp.
    pub fn pts(&self) -> EpochNanos {
        self.pts
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the number of samples per channel.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Returns the audio duration derived from the sample count.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.frame_count as u64 * NANOS_PER_SEC / self.sample_rate as u64)
    }

    /// Returns the instant at which this frame's audio ends.
    pub fn end_pts(&self) -> EpochNanos {
        self.pts + self.duration()
    }

    pub(crate) fn with_pts(mut self, pts: EpochNanos) -> Self {
        self.pts = pts;
        self
    }
}
