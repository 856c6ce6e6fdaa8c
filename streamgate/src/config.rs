//! Gate configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the gate, buffer, timestamp policy, and sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Maximum buffered audio span before the oldest frames are evicted.
    #[serde(default = "default_max_buffer_window")]
    pub max_buffer_window: Duration,
    /// Frames longer than this are reported as anomalously large chunks.
    #[serde(default = "default_max_frame_duration")]
    pub max_frame_duration: Duration,
    /// How far ahead of the wall clock a capture timestamp may sit before it
    /// is treated as clock skew and reset.
    #[serde(default = "default_future_tolerance")]
    pub future_tolerance: Duration,
    /// How far behind the wall clock a capture timestamp may sit before it is
    /// treated as stale data and reset.
    #[serde(default = "default_stale_tolerance")]
    pub stale_tolerance: Duration,
    /// Total send attempts for a live frame.
    #[serde(default = "default_realtime_send_max_retries")]
    pub realtime_send_max_retries: u32,
    /// Total send attempts per frame during ordered replay.
    #[serde(default = "default_ordered_send_max_retries")]
    pub ordered_send_max_retries: u32,
}

fn default_max_buffer_window() -> Duration {
    Duration::from_secs(1)
}
fn default_max_frame_duration() -> Duration {
    Duration::from_millis(100)
}
fn default_future_tolerance() -> Duration {
    Duration::from_millis(100)
}
fn default_stale_tolerance() -> Duration {
    Duration::from_secs(5)
}
fn default_realtime_send_max_retries() -> u32 {
    2
}
fn default_ordered_send_max_retries() -> u32 {
    3
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_buffer_window: default_max_buffer_window(),
            max_frame_duration: default_max_frame_duration(),
            future_tolerance: default_future_tolerance(),
            stale_tolerance: default_stale_tolerance(),
            realtime_send_max_retries: default_realtime_send_max_retries(),
            ordered_send_max_retries: default_ordered_send_max_retries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.max_buffer_window, Duration::from_secs(1));
        assert_eq!(config.max_frame_duration, Duration::from_millis(100));
        assert_eq!(config.future_tolerance, Duration::from_millis(100));
        assert_eq!(config.stale_tolerance, Duration::from_secs(5));
        assert_eq!(config.realtime_send_max_retries, 2);
        assert_eq!(config.ordered_send_max_retries, 3);
    }
}
