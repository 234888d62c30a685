pub mod publisher;
pub mod sink;

use serde::{Deserialize, Serialize};

pub use publisher::TelemetryPublisher;
pub use sink::{LogTelemetrySink, SqliteTelemetrySink, TelemetrySink};

/// Leaf keys written under the configured telemetry root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TelemetryKey {
    #[serde(rename = "fallDetected")]
    FallDetected,
    #[serde(rename = "Accelerometer")]
    Accelerometer,
    #[serde(rename = "heartRate")]
    HeartRate,
}

impl TelemetryKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKey::FallDetected => "fallDetected",
            TelemetryKey::Accelerometer => "Accelerometer",
            TelemetryKey::HeartRate => "heartRate",
        }
    }

    /// Full key path, e.g. `Users/wearer/vitals/fallDetected`.
    pub fn path_under(&self, root: &str) -> String {
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            self.as_str().to_string()
        } else {
            format!("{root}/{}", self.as_str())
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Float(f64),
}

impl TelemetryValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TelemetryValue::Bool(value) => serde_json::Value::Bool(*value),
            // NaN and infinities have no JSON form.
            TelemetryValue::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl std::fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryValue::Bool(value) => write!(f, "{value}"),
            TelemetryValue::Float(value) => write!(f, "{value}"),
        }
    }
}

/// A single key-path write.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryWrite {
    pub path: String,
    pub key: TelemetryKey,
    pub value: TelemetryValue,
}
