use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{detector::FallDetectorController, vitals::VitalsRelay};

use super::SensorEvent;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensingStats {
    pub accel_samples: u64,
    pub heart_rate_samples: u64,
}

/// Feeds sensor events to their consumers one at a time, in arrival order.
pub async fn sensing_loop(
    mut events: mpsc::Receiver<SensorEvent>,
    detector: FallDetectorController,
    vitals: VitalsRelay,
    cancel_token: CancellationToken,
) -> SensingStats {
    let mut stats = SensingStats::default();

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    log_info!("sensor stream closed");
                    break;
                };

                match event {
                    SensorEvent::Accel(sample) => {
                        detector.process_sample(sample).await;
                        stats.accel_samples += 1;
                    }
                    SensorEvent::HeartRate { bpm, .. } => {
                        vitals.forward(bpm);
                        stats.heart_rate_samples += 1;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sensing loop shutting down");
                break;
            }
        }
    }

    log_info!(
        "processed {} accelerometer and {} heart-rate samples",
        stats.accel_samples,
        stats.heart_rate_samples
    );
    stats
}
