//! Timestamp validation and repair.
//!
//! Capture timestamps from a live pipeline may be missing, clock-skewed,
//! stale, or out of order. The policy rewrites every anomaly to a safe value
//! and reports the repair; it never fails.

use std::time::Duration;

use tracing::warn;

use crate::hooks::{RepairReason, StreamHooks};
use crate::timestamp::EpochNanos;

/// Pure validation/repair rules for capture timestamps.
///
/// The repaired value is guaranteed to be defined, to lie within
/// `[now - stale_tolerance, now + future_tolerance]` before the monotonic
/// correction, and to be no earlier than the accepted watermark.
#[derive(Debug, Clone, Copy)]
pub struct TimestampPolicy {
    future_tolerance: Duration,
    stale_tolerance: Duration,
}

impl TimestampPolicy {
    /// Creates a policy with the given tolerances.
    pub fn new(future_tolerance: Duration, stale_tolerance: Duration) -> Self {
        Self {
            future_tolerance,
            stale_tolerance,
        }
    }

    /// Validates a capture timestamp against the wall clock (`now`) and the
    /// accepted watermark, returning the repaired value.
    ///
    /// Repair is a projection: applying it twice with the same watermark and
    /// reference time yields the same result.
    pub fn validate(
        &self,
        pts: Option<EpochNanos>,
        last_accepted: Option<EpochNanos>,
        now: EpochNanos,
        hooks: &dyn StreamHooks,
    ) -> EpochNanos {
        let mut repaired = match pts {
            Some(p) => p,
            None => {
                warn!("audio frame has no capture timestamp, using current time");
                hooks.on_timestamp_repaired(RepairReason::Missing, None, now);
                now
            }
        };

        if repaired > now + self.future_tolerance {
            warn!(
                pts = repaired.as_nanos(),
                "capture timestamp is significantly in the future, using current time"
            );
            hooks.on_timestamp_repaired(RepairReason::FutureSkew, Some(repaired), now);
            repaired = now;
        }

        if repaired < now - self.stale_tolerance {
            warn!(
                pts = repaired.as_nanos(),
                "capture timestamp is too old, using current time"
            );
            hooks.on_timestamp_repaired(RepairReason::Stale, Some(repaired), now);
            repaired = now;
        }

        if let Some(last) = last_accepted {
            if repaired < last {
                let fixed = last + 1i64;
                warn!(
                    pts = repaired.as_nanos(),
                    last = last.as_nanos(),
                    "capture timestamp is before the watermark, adjusting"
                );
                hooks.on_timestamp_repaired(RepairReason::OutOfOrder, Some(repaired), fixed);
                repaired = fixed;
            }
        }

        repaired
    }
}
