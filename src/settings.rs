use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::backend::DEFAULT_TIMEOUT;

pub const ENV_BACKEND_URL: &str = "CARTCHECK_BACKEND_URL";
pub const ENV_MODE: &str = "CARTCHECK_MODE";
pub const ENV_DEBUG: &str = "CARTCHECK_DEBUG";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectionMode {
    /// Frames go to the HTTP detection backend.
    Live,
    /// Detections are sampled locally from the required list.
    Simulated,
}

impl DetectionMode {
    pub fn default_interval(&self) -> Duration {
        match self {
            DetectionMode::Live => Duration::from_millis(1000),
            DetectionMode::Simulated => Duration::from_millis(2000),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Some(DetectionMode::Live),
            "simulated" | "sim" => Some(DetectionMode::Simulated),
            _ => None,
        }
    }
}

impl Default for DetectionMode {
    fn default() -> Self {
        DetectionMode::Simulated
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MergePolicy {
    /// Each round's detections replace the previous set.
    Replace,
    /// Detections persist until they fall out of the staleness window.
    Sticky,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy::Replace
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub mode: DetectionMode,
    pub backend_url: String,
    /// Falls back to the mode's cadence when unset.
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: u64,
    /// Falls back to the request timeout plus one second when unset.
    pub round_timeout_ms: Option<u64>,
    pub merge_policy: MergePolicy,
    pub staleness_window_secs: u64,
    /// Detections below this confidence never reach the checklist.
    pub min_confidence: f32,
    pub simulation_seed: Option<u64>,
    /// Image file re-read on every live capture; a synthetic frame is used when unset.
    pub frame_path: Option<PathBuf>,
    pub location: Option<String>,
    pub heartbeat_every_ticks: u32,
    pub retention_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Simulated,
            backend_url: "http://localhost:8000".into(),
            poll_interval_ms: None,
            request_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            round_timeout_ms: None,
            merge_policy: MergePolicy::Replace,
            staleness_window_secs: 10,
            min_confidence: 0.0,
            simulation_seed: None,
            frame_path: None,
            location: None,
            heartbeat_every_ticks: 10,
            retention_days: 30,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.mode.default_interval())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn round_timeout(&self) -> Duration {
        self.round_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.request_timeout() + Duration::from_secs(1))
    }

    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_window_secs.min(i64::MAX as u64) as i64)
    }

    pub fn heartbeat_every(&self) -> u32 {
        self.heartbeat_every_ticks.max(1)
    }

    /// Applies `CARTCHECK_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|url| !url.trim().is_empty()) {
            self.backend_url = url;
        }

        if let Some(raw) = lookup(ENV_MODE) {
            match DetectionMode::parse(&raw) {
                Some(mode) => self.mode = mode,
                None => warn!("ignoring {ENV_MODE}={raw}: expected 'live' or 'simulated'"),
            }
        }

        let debug_mode = lookup(ENV_DEBUG)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.heartbeat_every_ticks = 1;
        }
    }
}

/// JSON-backed settings file in the data directory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Settings at {} are invalid ({err}); using defaults", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> Settings {
        self.read().clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn interval_follows_mode_unless_overridden() {
        let mut settings = Settings::default();
        assert_eq!(settings.poll_interval(), Duration::from_millis(2000));

        settings.mode = DetectionMode::Live;
        assert_eq!(settings.poll_interval(), Duration::from_millis(1000));

        settings.poll_interval_ms = Some(250);
        assert_eq!(settings.poll_interval(), Duration::from_millis(250));

        settings.poll_interval_ms = Some(0);
        assert_eq!(settings.poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn round_timeout_defaults_past_request_timeout() {
        let settings = Settings::default();
        assert_eq!(settings.round_timeout(), Duration::from_millis(11_000));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, r#"{"mode":"live","mergePolicy":"sticky"}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.settings();
        assert_eq!(settings.mode, DetectionMode::Live);
        assert_eq!(settings.merge_policy, MergePolicy::Sticky);
        assert_eq!(settings.staleness_window_secs, 10);
        assert_eq!(settings.request_timeout_ms, 10_000);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ nope").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings(), Settings::default());
    }

    #[test]
    fn update_persists_for_the_next_run() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.settings();
        settings.simulation_seed = Some(99);
        settings.location = Some("ER bay 3".into());
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.settings(), settings);
        assert_eq!(reopened.settings().simulation_seed, Some(99));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            (ENV_BACKEND_URL, "http://detector:9000"),
            (ENV_MODE, "LIVE"),
            (ENV_DEBUG, "true"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(settings.backend_url, "http://detector:9000");
        assert_eq!(settings.mode, DetectionMode::Live);
        assert_eq!(settings.heartbeat_every(), 1);
    }

    #[test]
    fn unknown_mode_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| (key == ENV_MODE).then(|| "webcam".to_string()));
        assert_eq!(settings.mode, DetectionMode::Simulated);
    }
}
