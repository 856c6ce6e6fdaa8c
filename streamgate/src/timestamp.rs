//! Epoch nanosecond timestamp utilities.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp in nanoseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct EpochNanos(pub i64);

impl EpochNanos {
    /// Creates a new EpochNanos from nanoseconds.
    pub const fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    /// Returns the current time as EpochNanos.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self(duration.as_nanos() as i64)
    }

    /// Converts to nanoseconds.
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Converts to Duration.
    pub fn to_duration(&self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64)
    }

    /// Creates from Duration.
    pub fn from_duration(d: Duration) -> Self {
        Self(d.as_nanos() as i64)
    }

    /// Adds a Duration.
    pub fn add(&self, d: Duration) -> Self {
        Self(self.0 + d.as_nanos() as i64)
    }

    /// Subtracts another EpochNanos, returning the difference as Duration.
    /// Saturates to zero when `other` is later.
    pub fn sub(&self, other: EpochNanos) -> Duration {
        let diff = self.0 - other.0;
        if diff >= 0 {
            Duration::from_nanos(diff as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Returns the difference in nanoseconds.
    pub fn diff(&self, other: EpochNanos) -> i64 {
        self.0 - other.0
    }
}

impl std::ops::Add<Duration> for EpochNanos {
    type Output = Self;
    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.as_nanos() as i64)
    }
}

impl std::ops::Sub<Duration> for EpochNanos {
    type Output = Self;
    fn sub(self, rhs: Duration) -> Self::Output {
        Self(self.0 - rhs.as_nanos() as i64)
    }
}

impl std::ops::AddAssign<Duration> for EpochNanos {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.as_nanos() as i64;
    }
}

impl std::ops::Add<i64> for EpochNanos {
    type Output = Self;
    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::ops::Sub<i64> for EpochNanos {
    type Output = Self;
    fn sub(self, rhs: i64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl From<i64> for EpochNanos {
    fn from(ns: i64) -> Self {
        Self(ns)
    }
}

impl From<EpochNanos> for i64 {
    fn from(ns: EpochNanos) -> Self {
        ns.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_nanos() {
        let t1 = EpochNanos::from_nanos(1_000_000);
        let t2 = t1.add(Duration::from_micros(500));
        assert_eq!(t2.as_nanos(), 1_500_000);
        assert_eq!(t2.sub(t1), Duration::from_micros(500));
    }

    #[test]
    fn test_sub_saturates() {
        let t1 = EpochNanos::from_nanos(100);
        let t2 = EpochNanos::from_nanos(500);
        assert_eq!(t1.sub(t2), Duration::ZERO);
        assert_eq!(t1.diff(t2), -400);
    }

    #[test]
    fn test_duration_ops() {
        let t = EpochNanos::from_nanos(1_000_000_000);
        assert_eq!((t + Duration::from_secs(1)).as_nanos(), 2_000_000_000);
        assert_eq!((t - Duration::from_secs(1)).as_nanos(), 0);
    }

    #[test]
    fn test_now() {
        let t = EpochNanos::now();
        assert!(t.as_nanos() > 0);
    }
}
