//! Paced frame transmission with bounded retry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::frame::TimestampedFrame;
use crate::hooks::StreamHooks;
use crate::sink::AudioSink;
use crate::timestamp::EpochNanos;

/// Base delay between live-send attempts.
const REALTIME_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Base delay for ordered-replay backoff.
const ORDERED_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Sends frames to an [`AudioSink`], either immediately (live path) or paced
/// to their original capture cadence (replay path).
///
/// Send failures are retried a bounded number of times and then reported;
/// they never propagate to the caller. A dropped frame degrades recognition
/// accuracy, it must not take down the pipeline.
pub struct PacedSender {
    sink: Arc<dyn AudioSink>,
    hooks: Arc<dyn StreamHooks>,
    realtime_max_retries: u32,
    ordered_max_retries: u32,
    last_sent: Mutex<Option<EpochNanos>>,
}

impl PacedSender {
    /// Creates a sender with the given total attempt counts per frame.
    pub fn new(
        sink: Arc<dyn AudioSink>,
        hooks: Arc<dyn StreamHooks>,
        realtime_max_retries: u32,
        ordered_max_retries: u32,
    ) -> Self {
        Self {
            sink,
            hooks,
            realtime_max_retries: realtime_max_retries.max(1),
            ordered_max_retries: ordered_max_retries.max(1),
            last_sent: Mutex::new(None),
        }
    }

    /// Timestamp of the most recently attempted send. Non-decreasing once
    /// set, success or not.
    pub fn last_sent(&self) -> Option<EpochNanos> {
        *self.last_sent.lock().unwrap()
    }

    fn mark_sent(&self, pts: EpochNanos) {
        let mut last = self.last_sent.lock().unwrap();
        match *last {
            Some(prev) if prev >= pts => {}
            _ => *last = Some(pts),
        }
    }

    /// Sends a single live frame immediately.
    ///
    /// Transient failures are retried with a short increasing delay; if every
    /// attempt fails the error is reported and the frame is dropped.
    pub async fn send_realtime(&self, frame: TimestampedFrame) {
        self.mark_sent(frame.pts());

        for attempt in 1..=self.realtime_max_retries {
            match self.sink.send_audio_frame(frame.audio()).await {
                Ok(()) => return,
                Err(e) => {
                    self.hooks.on_send_failed(attempt, &e);
                    if attempt == self.realtime_max_retries {
                        error!(
                            attempts = attempt,
                            error = %e,
                            "failed to send realtime frame, dropping"
                        );
                        return;
                    }
                    sleep(REALTIME_RETRY_DELAY * attempt).await;
                }
            }
        }
    }

    /// Replays buffered frames preserving their original relative spacing.
    ///
    /// Frames are sorted defensively, then each is held back until the wall
    /// clock reaches its capture instant, so the recognizer receives audio at
    /// the rate it was captured rather than in a burst. Sends are retried
    /// with exponential backoff; a frame that exhausts its retries is
    /// reported and skipped, the remaining replay continues. Cancelling the
    /// token ends the replay early and discards the remaining frames.
    pub async fn send_ordered(&self, mut frames: Vec<TimestampedFrame>, cancel: &CancellationToken) {
        if frames.is_empty() {
            return;
        }
        frames.sort_by_key(|f| f.pts().as_nanos());

        let total = frames.len();
        let mut current = EpochNanos::now();
        for (i, frame) in frames.into_iter().enumerate() {
            let target = frame.pts();
            if target > current {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(sent = i, total, "ordered replay cancelled");
                        return;
                    }
                    _ = sleep(target.sub(current)) => {}
                }
                current = EpochNanos::now();
            }

            self.mark_sent(target);

            for attempt in 1..=self.ordered_max_retries {
                match self.sink.send_audio_frame(frame.audio()).await {
                    Ok(()) => break,
                    Err(e) => {
                        self.hooks.on_send_failed(attempt, &e);
                        if attempt == self.ordered_max_retries {
                            error!(
                                index = i,
                                total,
                                attempts = attempt,
                                error = %e,
                                "failed to send frame during ordered replay, skipping"
                            );
                            break;
                        }
                        let backoff = ORDERED_RETRY_DELAY * 2u32.pow(attempt - 1);
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!(sent = i, total, "ordered replay cancelled");
                                return;
                            }
                            _ = sleep(backoff) => {}
                        }
                    }
                }
            }
        }
    }
}
