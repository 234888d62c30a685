use std::sync::Arc;

use log::warn;
use tokio::sync::{mpsc, oneshot};

use super::{TelemetryKey, TelemetrySink, TelemetryValue, TelemetryWrite};

enum PublisherCommand {
    Write(TelemetryWrite),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front of a [`TelemetrySink`].
///
/// `publish` never blocks the caller. Writes are queued and handed to the sink one at a
/// time, in order, by a single worker task; a failed write is logged and dropped.
#[derive(Clone)]
pub struct TelemetryPublisher {
    root: Arc<str>,
    tx: mpsc::UnboundedSender<PublisherCommand>,
}

impl TelemetryPublisher {
    /// Starts the worker task. Must be called from within a tokio runtime.
    pub fn spawn(root: impl Into<String>, sink: Arc<dyn TelemetrySink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PublisherCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PublisherCommand::Write(write) => {
                        if let Err(err) = sink.write(&write).await {
                            warn!(
                                "telemetry sink '{}' failed to write {}: {err:#}",
                                sink.name(),
                                write.path
                            );
                        }
                    }
                    PublisherCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        let root: String = root.into();
        Self {
            root: Arc::from(root),
            tx,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn publish(&self, key: TelemetryKey, value: TelemetryValue) {
        let write = TelemetryWrite {
            path: key.path_under(&self.root),
            key,
            value,
        };
        if self.tx.send(PublisherCommand::Write(write)).is_err() {
            warn!("telemetry worker stopped; dropping {} write", key.as_str());
        }
    }

    /// Waits until every write queued before this call has reached the sink.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PublisherCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[tokio::test]
    async fn writes_arrive_in_order_under_root() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = TelemetryPublisher::spawn("Users/wearer/vitals", sink.clone());

        publisher.publish(TelemetryKey::Accelerometer, TelemetryValue::Float(9.8));
        publisher.publish(TelemetryKey::FallDetected, TelemetryValue::Bool(true));
        publisher.publish(TelemetryKey::Accelerometer, TelemetryValue::Float(12.3));
        publisher.flush().await;

        let writes = sink.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1].path, "Users/wearer/vitals/fallDetected");
        assert_eq!(
            sink.values_for(TelemetryKey::Accelerometer),
            vec![TelemetryValue::Float(9.8), TelemetryValue::Float(12.3)]
        );
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let sink = Arc::new(RecordingSink::failing());
        let publisher = TelemetryPublisher::spawn("root", sink.clone());

        publisher.publish(TelemetryKey::HeartRate, TelemetryValue::Float(71.0));
        publisher.publish(TelemetryKey::HeartRate, TelemetryValue::Float(72.0));
        publisher.flush().await;

        assert_eq!(sink.values_for(TelemetryKey::HeartRate).len(), 2);
    }
}
