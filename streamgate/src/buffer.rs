//! Time-ordered bounded audio buffer.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::frame::TimestampedFrame;
use crate::hooks::StreamHooks;
use crate::policy::TimestampPolicy;
use crate::timestamp::EpochNanos;

/// In-memory buffer of validated frames kept sorted by capture timestamp and
/// bounded to a sliding time window.
///
/// Insertion repairs the frame's timestamp against the buffer watermark, so
/// the stored sequence is always non-decreasing. After each insertion the
/// buffer evicts the oldest frames until the spanned duration fits the
/// window, and drops frames that have fallen behind the wall clock by more
/// than the window. Eviction is silent; it is the expected steady-state
/// behavior, not an error.
pub struct TimeOrderedBuffer {
    frames: Vec<TimestampedFrame>,
    window: Duration,
    max_frame_duration: Duration,
    policy: TimestampPolicy,
    last_accepted: Option<EpochNanos>,
    hooks: Arc<dyn StreamHooks>,
}

impl TimeOrderedBuffer {
    /// Creates a new buffer with the given window.
    pub fn new(
        window: Duration,
        max_frame_duration: Duration,
        policy: TimestampPolicy,
        hooks: Arc<dyn StreamHooks>,
    ) -> Self {
        Self {
            frames: Vec::new(),
            window,
            max_frame_duration,
            policy,
            last_accepted: None,
            hooks,
        }
    }

    /// Inserts a frame in timestamp order, repairing its timestamp against
    /// the buffer watermark, then evicts frames outside the window.
    pub fn add(&mut self, frame: TimestampedFrame) {
        self.add_at(frame, EpochNanos::now());
    }

    fn add_at(&mut self, frame: TimestampedFrame, now: EpochNanos) {
        if frame.duration() > self.max_frame_duration {
            warn!(
                duration_ms = frame.duration().as_millis() as u64,
                "anomalously large audio frame"
            );
        }

        let pts = self
            .policy
            .validate(Some(frame.pts()), self.last_accepted, now, self.hooks.as_ref());
        let frame = frame.with_pts(pts);
        self.last_accepted = Some(pts);

        // Stable insert: frames with equal timestamps keep arrival order.
        let idx = self.frames.partition_point(|f| f.pts() <= pts);
        self.frames.insert(idx, frame);

        while self.span() > self.window {
            self.frames.remove(0);
        }

        self.evict_older_than(now);
    }

    /// Drops frames whose timestamps lag the wall clock by more than the
    /// window. Covers a burst of old frames whose total span looks fine.
    fn evict_older_than(&mut self, now: EpochNanos) {
        let cutoff = now - self.window;
        let keep_from = self.frames.partition_point(|f| f.pts() < cutoff);
        if keep_from > 0 {
            self.frames.drain(..keep_from);
        }
    }

    /// Removes and returns, in ascending order, the frames with a timestamp
    /// at or before the given instant. Later frames stay buffered.
    pub fn take_up_to(&mut self, pts: EpochNanos) -> Vec<TimestampedFrame> {
        let cut = self.frames.partition_point(|f| f.pts() <= pts);
        self.frames.drain(..cut).collect()
    }

    /// Removes and returns all frames in ascending order.
    pub fn drain_all(&mut self) -> Vec<TimestampedFrame> {
        std::mem::take(&mut self.frames)
    }

    /// Returns true if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the number of buffered frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns the accepted-timestamp watermark.
    pub fn last_accepted(&self) -> Option<EpochNanos> {
        self.last_accepted
    }

    /// Returns the spanned duration from the first frame's start to the last
    /// frame's end, or zero when empty.
    pub fn span(&self) -> Duration {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.end_pts().sub(first.pts()),
            _ => Duration::ZERO,
        }
    }
}
