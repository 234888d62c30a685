use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens when motion is seen while an auto-clear is already pending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Keep the deadline armed by the first motion sample after confirmation. The earliest
    /// scheduled clear wins, so continued motion never postpones it. This is the default.
    KeepPending,
    /// Move the deadline to `t + reset_delay` on every motion sample, cancelling the old one.
    Replace,
}

impl Default for RearmPolicy {
    fn default() -> Self {
        RearmPolicy::KeepPending
    }
}

/// Thresholds and timings for fall classification. Magnitudes are in m/s².
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct DetectorConfig {
    /// Magnitude strictly above this is a candidate impact spike
    pub high_accel_threshold: f64,

    /// Inclusive bounds of the resting band (~1g)
    pub stable_lower: f64,
    pub stable_upper: f64,

    /// Uninterrupted time in the resting band needed to confirm a fall
    pub stable_duration_ms: u64,

    /// Grace period between renewed motion and the alert clearing itself
    pub reset_delay_ms: u64,

    pub rearm_policy: RearmPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            high_accel_threshold: 25.0,
            stable_lower: 9.0,
            stable_upper: 10.0,
            stable_duration_ms: 10_000,
            reset_delay_ms: 15_000,
            rearm_policy: RearmPolicy::KeepPending,
        }
    }
}

impl DetectorConfig {
    pub fn stable_duration(&self) -> Duration {
        Duration::from_millis(self.stable_duration_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn is_spike(&self, magnitude: f64) -> bool {
        magnitude > self.high_accel_threshold
    }

    pub fn in_stable_band(&self, magnitude: f64) -> bool {
        magnitude >= self.stable_lower && magnitude <= self.stable_upper
    }

    pub fn is_moving(&self, magnitude: f64) -> bool {
        magnitude > self.stable_upper
    }
}
