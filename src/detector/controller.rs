use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use crate::telemetry::{TelemetryKey, TelemetryPublisher, TelemetryValue};

use super::{
    AccelSample, DetectorConfig, DetectorPhase, DetectorState, FallAlert, ResetSchedule,
    SampleOutcome,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const STATUS_CHANNEL_CAPACITY: usize = 32;

/// Published on every alert transition; this is what a status display renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallStatusEvent {
    pub active: bool,
    pub status: String,
    pub incident_id: Option<Uuid>,
    pub at: DateTime<Utc>,
    #[serde(skip)]
    pub reported_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSnapshot {
    pub phase: DetectorPhase,
    pub alert_active: bool,
    pub incident_id: Option<Uuid>,
    pub reset_in_ms: Option<u64>,
}

struct DetectorShared {
    state: DetectorState,
    incident_id: Option<Uuid>,
}

/// Drives a [`DetectorState`] from live samples and owns its auto-clear timer.
///
/// Every read-modify-write of the state, including the timer firing, happens under one
/// lock, so a clear can never interleave with a sample.
#[derive(Clone)]
pub struct FallDetectorController {
    shared: Arc<Mutex<DetectorShared>>,
    config: Arc<DetectorConfig>,
    publisher: TelemetryPublisher,
    events: broadcast::Sender<FallStatusEvent>,
    reset_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FallDetectorController {
    pub fn new(config: DetectorConfig, publisher: TelemetryPublisher) -> Self {
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Mutex::new(DetectorShared {
                state: DetectorState::new(),
                incident_id: None,
            })),
            config: Arc::new(config),
            publisher,
            events,
            reset_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FallStatusEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> DetectorSnapshot {
        let guard = self.shared.lock().await;
        let now = Instant::now();
        DetectorSnapshot {
            phase: guard.state.phase,
            alert_active: guard.state.is_alert_active(),
            incident_id: guard.incident_id,
            reset_in_ms: guard
                .state
                .pending_reset_deadline()
                .map(|deadline| deadline.saturating_duration_since(now).as_millis() as u64),
        }
    }

    pub async fn process_sample(&self, sample: AccelSample) -> SampleOutcome {
        let mut guard = self.shared.lock().await;
        let previous_phase = guard.state.phase;
        let outcome = guard.state.on_sample(&sample, &self.config);

        if let Some(cleared) = outcome.expired_reset {
            let incident_id = guard.incident_id.take();
            log_info!("auto-clear deadline reached before its timer, fall alert cleared");
            self.cancel_reset_task().await;
            self.emit_alert(cleared, incident_id);
        }

        let now_watching = guard.state.phase == DetectorPhase::Watching;
        if previous_phase != DetectorPhase::Watching && now_watching {
            log_info!(
                "high acceleration {:.2} m/s², watching for stillness",
                outcome.magnitude
            );
        }

        if let Some(alert) = outcome.alert {
            let incident_id = Uuid::new_v4();
            guard.incident_id = Some(incident_id);
            log_warn!("fall confirmed (incident {incident_id})");
            self.cancel_reset_task().await;
            self.emit_alert(alert, Some(incident_id));
        }

        if let Some(schedule) = outcome.schedule {
            log_info!(
                "movement after fall ({:.2} m/s²), auto-clear in {} ms",
                outcome.magnitude,
                self.config.reset_delay_ms
            );
            self.spawn_reset_task(schedule).await;
        }

        self.publisher.publish(
            TelemetryKey::Accelerometer,
            TelemetryValue::Float(outcome.reported_magnitude),
        );
        debug!(
            "accel {:.2} m/s² phase={}",
            outcome.reported_magnitude,
            guard.state.phase.as_str()
        );

        outcome
    }

    /// Clears the detector outside the timer path, cancelling any pending auto-clear.
    pub async fn reset(&self) {
        let mut guard = self.shared.lock().await;
        let cleared = guard.state.reset(Instant::now());
        self.cancel_reset_task().await;

        if let Some(alert) = cleared {
            let incident_id = guard.incident_id.take();
            log_info!("fall alert reset manually");
            self.emit_alert(alert, incident_id);
        }
    }

    pub async fn shutdown(&self) {
        self.cancel_reset_task().await;
    }

    async fn spawn_reset_task(&self, schedule: ResetSchedule) {
        let mut task_guard = self.reset_task.lock().await;
        if let Some(handle) = task_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            time::sleep_until(schedule.deadline).await;
            controller.fire_reset(schedule).await;
        });

        *task_guard = Some(handle);
    }

    async fn cancel_reset_task(&self) {
        if let Some(handle) = self.reset_task.lock().await.take() {
            handle.abort();
        }
    }

    async fn fire_reset(&self, schedule: ResetSchedule) {
        let mut guard = self.shared.lock().await;
        match guard.state.fire_reset(schedule.generation, schedule.deadline) {
            Some(alert) => {
                let incident_id = guard.incident_id.take();
                log_info!("wearer active again, fall alert cleared");
                self.emit_alert(alert, incident_id);
            }
            None => debug!("stale auto-clear {} ignored", schedule.generation),
        }
    }

    fn emit_alert(&self, alert: FallAlert, incident_id: Option<Uuid>) {
        self.publisher
            .publish(TelemetryKey::FallDetected, TelemetryValue::Bool(alert.active));

        let event = FallStatusEvent {
            active: alert.active,
            status: alert.status_text().to_string(),
            incident_id,
            at: Utc::now(),
            reported_at: alert.reported_at,
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::detector::RearmPolicy;
    use crate::telemetry::publisher::testing::RecordingSink;

    struct Harness {
        base: Instant,
        controller: FallDetectorController,
        sink: Arc<RecordingSink>,
        events: broadcast::Receiver<FallStatusEvent>,
    }

    impl Harness {
        fn new(config: DetectorConfig) -> Self {
            let sink = Arc::new(RecordingSink::default());
            let publisher = TelemetryPublisher::spawn("Users/wearer/vitals", sink.clone());
            let controller = FallDetectorController::new(config, publisher);
            let events = controller.subscribe();
            Self {
                base: Instant::now(),
                controller,
                sink,
                events,
            }
        }

        fn at(&self, t_ms: u64) -> Instant {
            self.base + Duration::from_millis(t_ms)
        }

        /// Advances virtual time to `t_ms` and delivers a sample of magnitude `m`.
        async fn feed(&self, t_ms: u64, m: f64) -> SampleOutcome {
            time::sleep_until(self.at(t_ms)).await;
            self.controller
                .process_sample(AccelSample::new(0.0, m, 0.0, self.at(t_ms)))
                .await
        }

        async fn feed_every_second(&self, from_ms: u64, to_ms: u64, m: f64) {
            let mut t = from_ms;
            while t <= to_ms {
                self.feed(t, m).await;
                t += 1000;
            }
        }

        async fn advance_to(&self, t_ms: u64) {
            time::sleep_until(self.at(t_ms)).await;
            tokio::task::yield_now().await;
        }

        fn event_times(&mut self) -> Vec<(u64, bool)> {
            let mut seen = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                let t = event.reported_at.duration_since(self.base).as_millis() as u64;
                seen.push((t, event.active));
            }
            seen
        }
    }

    async fn confirm_fall(harness: &mut Harness) {
        harness.feed(0, 30.0).await;
        harness.feed_every_second(1000, 11_000, 9.5).await;
        assert_eq!(harness.event_times(), vec![(11_000, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_publishes_alert_and_status() {
        let mut harness = Harness::new(DetectorConfig::default());
        confirm_fall(&mut harness).await;

        let snapshot = harness.controller.snapshot().await;
        assert_eq!(snapshot.phase, DetectorPhase::Confirmed);
        assert!(snapshot.alert_active);
        assert!(snapshot.incident_id.is_some());
        assert_eq!(snapshot.reset_in_ms, None);

        harness.controller.publisher.flush().await;
        assert_eq!(
            harness.sink.values_for(TelemetryKey::FallDetected),
            vec![TelemetryValue::Bool(true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn every_sample_reports_rounded_magnitude() {
        let harness = Harness::new(DetectorConfig::default());
        harness.feed(0, 9.806_65).await;
        harness.feed(100, 3.333_3).await;
        harness.feed(200, 31.0).await;
        harness.controller.publisher.flush().await;

        assert_eq!(
            harness.sink.values_for(TelemetryKey::Accelerometer),
            vec![
                TelemetryValue::Float(9.81),
                TelemetryValue::Float(3.33),
                TelemetryValue::Float(31.0)
            ]
        );
        assert!(harness.sink.values_for(TelemetryKey::FallDetected).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn motion_after_fall_clears_exactly_after_reset_delay() {
        let mut harness = Harness::new(DetectorConfig::default());
        harness.feed(0, 30.0).await;
        harness.feed(0, 9.5).await;
        harness.feed_every_second(1000, 10_000, 9.5).await;
        assert_eq!(harness.event_times(), vec![(10_000, true)]);
        assert!(harness.controller.snapshot().await.alert_active);

        let outcome = harness.feed(10_001, 12.0).await;
        assert_eq!(outcome.schedule.map(|s| s.deadline), Some(harness.at(25_001)));

        harness.advance_to(25_000).await;
        let snapshot = harness.controller.snapshot().await;
        assert!(snapshot.alert_active);
        assert_eq!(snapshot.reset_in_ms, Some(1));

        harness.advance_to(25_002).await;
        let snapshot = harness.controller.snapshot().await;
        assert_eq!(snapshot.phase, DetectorPhase::Idle);
        assert!(!snapshot.alert_active);
        assert_eq!(snapshot.incident_id, None);
        assert_eq!(harness.event_times(), vec![(25_001, false)]);

        harness.controller.publisher.flush().await;
        assert_eq!(
            harness.sink.values_for(TelemetryKey::FallDetected),
            vec![TelemetryValue::Bool(true), TelemetryValue::Bool(false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_confirm_share_the_incident_id() {
        let mut harness = Harness::new(DetectorConfig::default());
        harness.feed(0, 30.0).await;
        harness.feed_every_second(1000, 11_000, 9.5).await;
        let confirmed = harness.events.try_recv().expect("confirm event");
        assert_eq!(confirmed.status, "Fall detected!");

        harness.feed(12_000, 14.0).await;
        harness.advance_to(27_001).await;
        let cleared = harness.events.try_recv().expect("clear event");
        assert_eq!(cleared.status, "Status normal");
        assert_eq!(cleared.incident_id, confirmed.incident_id);
    }

    // With KeepPending the first motion sample fixes the deadline; later motion does not push it.
    #[tokio::test(start_paused = true)]
    async fn keep_pending_clears_fifteen_seconds_after_first_motion() {
        let mut harness = Harness::new(DetectorConfig::default());
        confirm_fall(&mut harness).await;

        harness.feed(12_000, 12.0).await;
        harness.feed_every_second(13_000, 26_000, 13.0).await;
        harness.advance_to(27_001).await;

        assert_eq!(harness.event_times(), vec![(27_000, false)]);
        assert_eq!(harness.controller.snapshot().await.phase, DetectorPhase::Idle);
    }

    // With Replace each motion sample cancels the pending timer and arms a later one.
    #[tokio::test(start_paused = true)]
    async fn replace_policy_clears_fifteen_seconds_after_last_motion() {
        let mut harness = Harness::new(DetectorConfig {
            rearm_policy: RearmPolicy::Replace,
            ..DetectorConfig::default()
        });
        confirm_fall(&mut harness).await;

        harness.feed(12_000, 12.0).await;
        harness.feed(20_000, 12.0).await;
        harness.advance_to(27_001).await;
        assert!(harness.event_times().is_empty());
        assert!(harness.controller.snapshot().await.alert_active);

        harness.advance_to(35_001).await;
        assert_eq!(harness.event_times(), vec![(35_000, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn spike_at_clear_deadline_starts_a_new_watch() {
        let mut harness = Harness::new(DetectorConfig::default());
        confirm_fall(&mut harness).await;
        harness.feed(12_000, 12.0).await;

        // Whichever of the sample and the timer runs first, the clear lands first.
        harness.feed(27_000, 30.0).await;
        harness.advance_to(28_000).await;

        assert_eq!(harness.event_times(), vec![(27_000, false)]);
        let snapshot = harness.controller.snapshot().await;
        assert_eq!(snapshot.phase, DetectorPhase::Watching);
        assert_eq!(snapshot.incident_id, None);
        assert_eq!(snapshot.reset_in_ms, None);

        harness.controller.publisher.flush().await;
        assert_eq!(
            harness.sink.values_for(TelemetryKey::FallDetected),
            vec![TelemetryValue::Bool(true), TelemetryValue::Bool(false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_sample_applies_expired_clear_before_the_timer() {
        let mut harness = Harness::new(DetectorConfig::default());
        confirm_fall(&mut harness).await;
        harness.feed(12_000, 12.0).await;

        // Deliver a sample stamped after the deadline without letting the timer run.
        let outcome = harness
            .controller
            .process_sample(AccelSample::new(0.0, 30.0, 0.0, harness.at(30_000)))
            .await;
        let cleared = outcome.expired_reset.expect("deadline passed");
        assert_eq!(cleared.reported_at, harness.at(27_000));
        assert_eq!(harness.event_times(), vec![(27_000, false)]);

        harness.advance_to(31_000).await;
        assert!(harness.event_times().is_empty());
        assert_eq!(harness.controller.snapshot().await.phase, DetectorPhase::Watching);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reset_cancels_scheduled_clear() {
        let mut harness = Harness::new(DetectorConfig::default());
        confirm_fall(&mut harness).await;
        harness.feed(12_000, 12.0).await;

        harness.controller.reset().await;
        let events = harness.event_times();
        assert_eq!(events.len(), 1);
        assert!(!events[0].1);

        // A fresh spike after the reset must not be wiped by the old timer.
        harness.feed(13_000, 30.0).await;
        harness.advance_to(30_000).await;
        assert!(harness.event_times().is_empty());
        assert_eq!(harness.controller.snapshot().await.phase, DetectorPhase::Watching);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_when_idle_emits_nothing() {
        let mut harness = Harness::new(DetectorConfig::default());
        harness.controller.reset().await;
        assert!(harness.event_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_cycles_produce_identical_timelines() {
        let mut harness = Harness::new(DetectorConfig::default());
        let mut timelines = Vec::new();

        for offset in [0u64, 60_000] {
            harness.feed(offset, 30.0).await;
            harness
                .feed_every_second(offset + 1000, offset + 11_000, 9.5)
                .await;
            harness.feed(offset + 12_000, 12.0).await;
            harness.advance_to(offset + 28_000).await;

            let relative: Vec<(u64, bool)> = harness
                .event_times()
                .into_iter()
                .map(|(t, active)| (t - offset, active))
                .collect();
            timelines.push(relative);
        }

        assert_eq!(timelines[0], vec![(11_000, true), (27_000, false)]);
        assert_eq!(timelines[0], timelines[1]);
    }
}
