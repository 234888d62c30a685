use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{detector::FallDetectorController, vitals::VitalsRelay};

use super::loop_worker::{sensing_loop, SensingStats};
use super::SensorEvent;

/// Owns the task that drains sensor events into the detector and vitals relay.
pub struct SensingController {
    handle: Option<JoinHandle<SensingStats>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_sensing(
        &mut self,
        events: mpsc::Receiver<SensorEvent>,
        detector: FallDetectorController,
        vitals: VitalsRelay,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sensing already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(
            events,
            detector,
            vitals,
            cancel_token.clone(),
        ));

        info!("sensing started");
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Waits for the event stream to end on its own.
    pub async fn wait(&mut self) -> Result<SensingStats> {
        self.cancel_token = None;
        self.join().await
    }

    pub async fn stop_sensing(&mut self) -> Result<SensingStats> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.join().await
    }

    async fn join(&mut self) -> Result<SensingStats> {
        match self.handle.take() {
            Some(handle) => handle.await.context("sensing loop task failed to join"),
            None => Ok(SensingStats::default()),
        }
    }
}

impl Default for SensingController {
    fn default() -> Self {
        Self::new()
    }
}
