use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::detector::DetectorConfig;

pub const CONFIG_ENV: &str = "FALLWATCH_CONFIG";
pub const DEBUG_ENV: &str = "FALLWATCH_DEBUG";
const DEFAULT_CONFIG_PATH: &str = "fallwatch.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Sqlite,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Key paths are written below this root
    pub root_path: String,
    pub sink: SinkKind,
    pub database_path: PathBuf,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            root_path: "Users/wearer/vitals".into(),
            sink: SinkKind::Sqlite,
            database_path: PathBuf::from("fallwatch.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub detector: DetectorConfig,
    pub telemetry: TelemetrySettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: Settings,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        } else {
            Settings::default()
        };

        Ok(Self { path, data })
    }

    /// Loads from `$FALLWATCH_CONFIG`, falling back to `fallwatch.json`.
    pub fn from_env() -> Result<Self> {
        let path = env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn detector(&self) -> DetectorConfig {
        self.data.detector.clone()
    }

    pub fn telemetry(&self) -> TelemetrySettings {
        self.data.telemetry.clone()
    }
}

pub fn debug_mode() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
