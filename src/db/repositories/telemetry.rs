use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_json},
    models::TelemetryRecord,
    Database,
};

fn row_to_record(row: &Row) -> Result<TelemetryRecord> {
    let path: String = row.get("path")?;
    let value: String = row.get("value")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(TelemetryRecord {
        path,
        value: parse_json(&value, "value")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Insert or overwrite the value stored at `path`.
    pub async fn upsert_telemetry(
        &self,
        path: &str,
        value: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = path.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO telemetry (path, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![path, value.to_string(), updated_at.to_rfc3339()],
            )
            .with_context(|| format!("failed to upsert telemetry at {path}"))?;
            Ok(())
        })
        .await
    }

    pub async fn get_telemetry(&self, path: &str) -> Result<Option<TelemetryRecord>> {
        let path = path.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT path, value, updated_at
                 FROM telemetry
                 WHERE path = ?1",
            )?;

            let mut rows = stmt.query(params![path])?;
            let record = match rows.next()? {
                Some(row) => Some(row_to_record(row)?),
                None => None,
            };
            Ok(record)
        })
        .await
    }

    /// All stored key paths, most recently updated first.
    pub async fn list_telemetry(&self) -> Result<Vec<TelemetryRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT path, value, updated_at
                 FROM telemetry
                 ORDER BY updated_at DESC, path ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }
}
