use log::debug;

use crate::telemetry::{TelemetryKey, TelemetryPublisher, TelemetryValue};

/// Forwards heart-rate samples to telemetry unchanged. Holds no state of its own.
#[derive(Clone)]
pub struct VitalsRelay {
    publisher: TelemetryPublisher,
}

impl VitalsRelay {
    pub fn new(publisher: TelemetryPublisher) -> Self {
        Self { publisher }
    }

    pub fn forward(&self, bpm: f64) {
        debug!("heart rate: {bpm} bpm");
        self.publisher
            .publish(TelemetryKey::HeartRate, TelemetryValue::Float(bpm));
    }
}
