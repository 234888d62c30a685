pub mod db;
pub mod detector;
pub mod sensing;
pub mod settings;
pub mod telemetry;
mod utils;
pub mod vitals;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::{
    fs::File,
    io::BufReader,
    signal,
    sync::{broadcast, mpsc},
};
use tokio_util::sync::CancellationToken;

use db::Database;
use detector::{FallDetectorController, FallStatusEvent};
use sensing::{replay_trace, SensingController, SensorEvent};
use settings::{SettingsStore, SinkKind};
use telemetry::{
    LogTelemetrySink, SqliteTelemetrySink, TelemetryKey, TelemetryPublisher, TelemetrySink,
    TelemetryValue,
};
use vitals::VitalsRelay;

const SENSOR_CHANNEL_CAPACITY: usize = 256;

const ENABLE_LOGS: bool = true;

pub fn run() {
    let level = if settings::debug_mode() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("fallwatch starting up...");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            log_error!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(serve()) {
        log_error!("fallwatch stopped: {err:#}");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let settings = SettingsStore::from_env()?;
    info!("settings loaded from {}", settings.path().display());

    let source = std::env::args().nth(1).unwrap_or_else(|| "-".to_string());
    let telemetry_settings = settings.telemetry();

    let (sink, database): (Arc<dyn TelemetrySink>, Option<Database>) = match telemetry_settings.sink
    {
        SinkKind::Sqlite => {
            let database = Database::new(telemetry_settings.database_path.clone())?;
            (
                Arc::new(SqliteTelemetrySink::new(database.clone())),
                Some(database),
            )
        }
        SinkKind::Log => (Arc::new(LogTelemetrySink), None),
    };
    let publisher = TelemetryPublisher::spawn(telemetry_settings.root_path.clone(), sink);

    if let Some(database) = &database {
        clear_stale_alert(database, &publisher).await?;
    }

    let detector = FallDetectorController::new(settings.detector(), publisher.clone());
    let config = detector.config();
    info!(
        "detector armed: spike > {} m/s², still band [{}, {}] for {} ms, auto-clear after {} ms ({:?})",
        config.high_accel_threshold,
        config.stable_lower,
        config.stable_upper,
        config.stable_duration_ms,
        config.reset_delay_ms,
        config.rearm_policy
    );
    spawn_status_display(detector.subscribe());

    let vitals = VitalsRelay::new(publisher.clone());
    let (events_tx, events_rx) = mpsc::channel(SENSOR_CHANNEL_CAPACITY);
    let mut sensing = SensingController::new();
    sensing.start_sensing(events_rx, detector.clone(), vitals)?;

    let cancel_token = CancellationToken::new();
    let replay = tokio::spawn(replay_source(source, events_tx, cancel_token.clone()));

    let interrupted = tokio::select! {
        result = replay => {
            result.context("trace replay task failed to join")??;
            false
        }
        _ = signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            true
        }
    };

    let stats = if interrupted {
        cancel_token.cancel();
        sensing.stop_sensing().await?
    } else {
        let stats = sensing.wait().await?;
        // Let a scheduled auto-clear land before exiting.
        if let Some(reset_in_ms) = detector.snapshot().await.reset_in_ms {
            info!("waiting {reset_in_ms} ms for pending auto-clear");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(reset_in_ms + 1)) => {}
                _ = signal::ctrl_c() => {}
            }
        }
        stats
    };

    detector.shutdown().await;
    publisher.flush().await;

    let snapshot = detector.snapshot().await;
    info!(
        "fallwatch done: {} accelerometer / {} heart-rate samples, final phase {}",
        stats.accel_samples,
        stats.heart_rate_samples,
        snapshot.phase.as_str()
    );
    Ok(())
}

async fn replay_source(
    source: String,
    events: mpsc::Sender<SensorEvent>,
    cancel_token: CancellationToken,
) -> Result<usize> {
    if source == "-" {
        info!("reading sensor trace from stdin");
        replay_trace(BufReader::new(tokio::io::stdin()), events, cancel_token).await
    } else {
        let file = File::open(&source)
            .await
            .with_context(|| format!("failed to open sensor trace {source}"))?;
        info!("replaying sensor trace {source}");
        replay_trace(BufReader::new(file), events, cancel_token).await
    }
}

/// Detector state starts fresh on every run, so a fall flag left set by a previous
/// process is cleared in the store.
async fn clear_stale_alert(database: &Database, publisher: &TelemetryPublisher) -> Result<()> {
    let stored = database.list_telemetry().await?;
    info!("telemetry store holds {} key paths", stored.len());

    let fall_path = TelemetryKey::FallDetected.path_under(publisher.root());
    let stale = stored
        .iter()
        .any(|record| record.path == fall_path && record.value == serde_json::json!(true));
    if stale {
        warn!("recovered active fall flag at {fall_path}; clearing");
        publisher.publish(TelemetryKey::FallDetected, TelemetryValue::Bool(false));
    }
    Ok(())
}

fn spawn_status_display(mut events: broadcast::Receiver<FallStatusEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.incident_id {
                    Some(id) => info!("status: {} (incident {id})", event.status),
                    None => info!("status: {}", event.status),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("status display skipped {skipped} updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
