//! Replays a recorded sensor trace as if it were arriving live.
//!
//! Traces are JSON lines, one event per line, timed in milliseconds from the start
//! of the recording:
//!
//! ```text
//! {"kind":"accel","t_ms":0,"x":0.1,"y":9.7,"z":0.4}
//! {"kind":"heart_rate","t_ms":250,"bpm":71.0}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::detector::AccelSample;

use super::SensorEvent;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceRecord {
    Accel { t_ms: u64, x: f64, y: f64, z: f64 },
    HeartRate { t_ms: u64, bpm: f64 },
}

impl TraceRecord {
    pub fn t_ms(&self) -> u64 {
        match self {
            TraceRecord::Accel { t_ms, .. } | TraceRecord::HeartRate { t_ms, .. } => *t_ms,
        }
    }

    pub fn into_event(self, start: Instant) -> SensorEvent {
        let timestamp = start + Duration::from_millis(self.t_ms());
        match self {
            TraceRecord::Accel { x, y, z, .. } => {
                SensorEvent::Accel(AccelSample::new(x, y, z, timestamp))
            }
            TraceRecord::HeartRate { bpm, .. } => SensorEvent::HeartRate { bpm, timestamp },
        }
    }
}

/// Parses one trace line. `Ok(None)` for blank and comment lines.
pub fn parse_trace_line(line: &str, line_no: usize) -> Result<Option<TraceRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .with_context(|| format!("invalid trace record on line {line_no}"))
}

/// Streams `reader` into `tx`, delivering each event at `start + t_ms`.
///
/// Returns the number of events delivered. Stops early on cancellation or when the
/// receiver goes away.
pub async fn replay_trace<R>(
    reader: R,
    tx: mpsc::Sender<SensorEvent>,
    cancel_token: CancellationToken,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let start = Instant::now();
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut delivered = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read sensor trace")?
    {
        line_no += 1;
        let Some(record) = parse_trace_line(&line, line_no)? else {
            continue;
        };

        let event = record.into_event(start);
        tokio::select! {
            _ = time::sleep_until(event.timestamp()) => {}
            _ = cancel_token.cancelled() => {
                log_info!("trace replay cancelled after {delivered} events");
                return Ok(delivered);
            }
        }

        if tx.send(event).await.is_err() {
            log_warn!("sensor consumer closed; stopping replay at line {line_no}");
            break;
        }
        delivered += 1;
    }

    log_info!("trace replay finished: {delivered} events");
    Ok(delivered)
}
