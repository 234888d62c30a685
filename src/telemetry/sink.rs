use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::info;

use crate::db::Database;

use super::TelemetryWrite;

/// Destination for key-path telemetry writes. Writes are last-write-wins per path.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, write: &TelemetryWrite) -> Result<()>;
}

/// Writes every key/value to the log.
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    fn name(&self) -> &str {
        "log"
    }

    async fn write(&self, write: &TelemetryWrite) -> Result<()> {
        info!("telemetry {} = {}", write.path, write.value);
        Ok(())
    }
}

/// Keeps the latest value per key path in the local SQLite store.
pub struct SqliteTelemetrySink {
    db: Database,
}

impl SqliteTelemetrySink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TelemetrySink for SqliteTelemetrySink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn write(&self, write: &TelemetryWrite) -> Result<()> {
        self.db
            .upsert_telemetry(&write.path, write.value.to_json(), Utc::now())
            .await
    }
}
