use tokio::time::Instant;

use crate::detector::AccelSample;

/// One reading from the wearable's sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    Accel(AccelSample),
    HeartRate { bpm: f64, timestamp: Instant },
}

impl SensorEvent {
    pub fn timestamp(&self) -> Instant {
        match self {
            SensorEvent::Accel(sample) => sample.timestamp,
            SensorEvent::HeartRate { timestamp, .. } => *timestamp,
        }
    }
}
