//! Stored telemetry values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest value written to a telemetry key path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub path: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
