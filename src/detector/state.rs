use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::config::{DetectorConfig, RearmPolicy};

pub const STATUS_FALL_DETECTED: &str = "Fall detected!";
pub const STATUS_NORMAL: &str = "Status normal";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectorPhase {
    Idle,
    Watching,
    Confirmed,
}

impl Default for DetectorPhase {
    fn default() -> Self {
        DetectorPhase::Idle
    }
}

impl DetectorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorPhase::Idle => "Idle",
            DetectorPhase::Watching => "Watching",
            DetectorPhase::Confirmed => "Confirmed",
        }
    }
}

/// One 3-axis accelerometer reading in m/s².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: Instant,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: Instant) -> Self {
        Self { x, y, z, timestamp }
    }

    pub fn magnitude(&self) -> f64 {
        magnitude(self.x, self.y, self.z)
    }
}

pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}

/// Rounds to two decimals for reporting. Comparisons always use the unrounded value.
pub fn round_magnitude(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallAlert {
    pub active: bool,
    pub reported_at: Instant,
}

impl FallAlert {
    pub fn status_text(&self) -> &'static str {
        if self.active {
            STATUS_FALL_DETECTED
        } else {
            STATUS_NORMAL
        }
    }
}

/// An armed auto-clear. `generation` identifies it so a superseded timer can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    pub deadline: Instant,
    pub generation: u64,
}

/// Everything one sample produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    pub magnitude: f64,
    pub reported_magnitude: f64,
    /// An auto-clear whose deadline this sample reached, applied before the sample itself.
    pub expired_reset: Option<FallAlert>,
    pub alert: Option<FallAlert>,
    pub schedule: Option<ResetSchedule>,
}

#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    pub phase: DetectorPhase,
    pub high_accel_at: Option<Instant>,
    /// Start of the current resting run; only ever set while `Watching`.
    pub stable_since: Option<Instant>,
    pub pending_reset: Option<ResetSchedule>,
    pub alert: Option<FallAlert>,
    reset_generation: u64,
}

impl DetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alert_active(&self) -> bool {
        self.phase == DetectorPhase::Confirmed
    }

    pub fn pending_reset_deadline(&self) -> Option<Instant> {
        self.pending_reset.map(|pending| pending.deadline)
    }

    /// Applies one sample to the state machine.
    pub fn on_sample(&mut self, sample: &AccelSample, config: &DetectorConfig) -> SampleOutcome {
        let t = sample.timestamp;
        let m = sample.magnitude();

        let mut outcome = SampleOutcome {
            magnitude: m,
            reported_magnitude: round_magnitude(m),
            expired_reset: None,
            alert: None,
            schedule: None,
        };

        // The clear takes effect at its deadline, whether or not the timer has fired yet.
        if let Some(pending) = self.pending_reset.filter(|pending| pending.deadline <= t) {
            outcome.expired_reset = Some(self.clear(pending.deadline));
        }

        // Spikes are ignored once a fall is confirmed.
        if config.is_spike(m) && self.phase != DetectorPhase::Confirmed {
            self.begin_watching(t);
        }

        if self.phase == DetectorPhase::Watching {
            if config.in_stable_band(m) {
                match self.stable_since {
                    None => self.stable_since = Some(t),
                    Some(since) => {
                        if t.saturating_duration_since(since) >= config.stable_duration() {
                            outcome.alert = Some(self.confirm(t));
                        }
                    }
                }
            } else {
                self.stable_since = None;
            }
            return outcome;
        }

        if self.phase == DetectorPhase::Confirmed && config.is_moving(m) {
            let arm = match (self.pending_reset, config.rearm_policy) {
                (None, _) => true,
                (Some(_), RearmPolicy::Replace) => true,
                (Some(_), RearmPolicy::KeepPending) => false,
            };
            if arm {
                outcome.schedule = Some(self.arm_reset(t + config.reset_delay()));
            }
        }

        outcome
    }

    /// Fires the auto-clear armed as `generation`. Returns `None` when that timer was
    /// superseded or cancelled in the meantime.
    pub fn fire_reset(&mut self, generation: u64, now: Instant) -> Option<FallAlert> {
        match self.pending_reset {
            Some(pending) if pending.generation == generation => Some(self.clear(now)),
            _ => None,
        }
    }

    /// Resets in place outside the timer path. Reports a cleared alert only if one was active.
    pub fn reset(&mut self, now: Instant) -> Option<FallAlert> {
        let was_active = self.is_alert_active();
        let cleared = self.clear(now);
        was_active.then_some(cleared)
    }

    fn begin_watching(&mut self, t: Instant) {
        self.phase = DetectorPhase::Watching;
        self.high_accel_at = Some(t);
        self.stable_since = None;
    }

    fn confirm(&mut self, t: Instant) -> FallAlert {
        self.phase = DetectorPhase::Confirmed;
        self.stable_since = None;
        self.cancel_pending_reset();

        let alert = FallAlert {
            active: true,
            reported_at: t,
        };
        self.alert = Some(alert);
        alert
    }

    fn arm_reset(&mut self, deadline: Instant) -> ResetSchedule {
        self.reset_generation = self.reset_generation.wrapping_add(1);
        let schedule = ResetSchedule {
            deadline,
            generation: self.reset_generation,
        };
        self.pending_reset = Some(schedule);
        schedule
    }

    fn cancel_pending_reset(&mut self) {
        if self.pending_reset.take().is_some() {
            self.reset_generation = self.reset_generation.wrapping_add(1);
        }
    }

    fn clear(&mut self, now: Instant) -> FallAlert {
        self.cancel_pending_reset();
        self.phase = DetectorPhase::Idle;
        self.high_accel_at = None;
        self.stable_since = None;

        let alert = FallAlert {
            active: false,
            reported_at: now,
        };
        self.alert = Some(alert);
        alert
    }
}
