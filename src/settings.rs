use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

pub const DEFAULT_DWELL_THRESHOLD_SECS: u64 = 300;
pub const DEFAULT_DWELL_RADIUS_METERS: f64 = 30.0;
pub const DEFAULT_COOLDOWN_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_LOOKUP_RADIUS_METERS: f64 = 100.0;

/// User-adjustable knobs for dwell detection and notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DwellSettings {
    pub dwell_threshold_secs: u64,
    pub dwell_radius_meters: f64,
    pub cooldown_ms: u64,
    pub notifications_enabled: bool,
    pub dwell_enabled: bool,
    pub lookup_radius_meters: f64,
}

impl Default for DwellSettings {
    fn default() -> Self {
        Self {
            dwell_threshold_secs: DEFAULT_DWELL_THRESHOLD_SECS,
            dwell_radius_meters: DEFAULT_DWELL_RADIUS_METERS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            notifications_enabled: true,
            dwell_enabled: true,
            lookup_radius_meters: DEFAULT_LOOKUP_RADIUS_METERS,
        }
    }
}

impl DwellSettings {
    /// Rejects values the detector and gate are not built to defend against.
    pub fn validate(&self) -> Result<()> {
        if self.dwell_threshold_secs == 0 {
            bail!("dwell threshold must be greater than zero");
        }
        if !(self.dwell_radius_meters.is_finite() && self.dwell_radius_meters > 0.0) {
            bail!(
                "dwell radius must be a positive number of meters, got {}",
                self.dwell_radius_meters
            );
        }
        if !(self.lookup_radius_meters.is_finite() && self.lookup_radius_meters > 0.0) {
            bail!(
                "lookup radius must be a positive number of meters, got {}",
                self.lookup_radius_meters
            );
        }
        Ok(())
    }

    /// Applies `SWIPERIGHT_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("SWIPERIGHT_DWELL_SECS") {
            self.dwell_threshold_secs = value
                .trim()
                .parse()
                .with_context(|| format!("invalid SWIPERIGHT_DWELL_SECS '{value}'"))?;
        }
        if let Some(value) = lookup("SWIPERIGHT_DWELL_RADIUS_M") {
            self.dwell_radius_meters = value
                .trim()
                .parse()
                .with_context(|| format!("invalid SWIPERIGHT_DWELL_RADIUS_M '{value}'"))?;
        }
        if let Some(value) = lookup("SWIPERIGHT_COOLDOWN_MS") {
            self.cooldown_ms = value
                .trim()
                .parse()
                .with_context(|| format!("invalid SWIPERIGHT_COOLDOWN_MS '{value}'"))?;
        }
        if let Some(value) = lookup("SWIPERIGHT_NOTIFICATIONS") {
            self.notifications_enabled = value == "1" || value.eq_ignore_ascii_case("true");
        }
        self.validate()?;
        Ok(self)
    }
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub settings: DwellSettings,
    /// Epoch milliseconds of the last generated notification.
    pub last_notification_at: Option<i64>,
}

/// Storage port for [`PersistedState`]: loaded once on start, saved on every change.
pub trait StatePersistence: Send + Sync {
    fn load(&self) -> Result<PersistedState>;
    fn save(&self, state: &PersistedState) -> Result<()>;
}

/// JSON file on disk. A missing or unreadable file yields defaults.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StatePersistence for SettingsStore {
    fn load(&self) -> Result<PersistedState> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;

        match serde_json::from_str(&contents) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(
                    "Ignoring corrupt settings file {}: {err}",
                    self.path.display()
                );
                Ok(PersistedState::default())
            }
        }
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    data: Mutex<PersistedState>,
}

impl MemoryPersistence {
    pub fn new(state: PersistedState) -> Self {
        Self {
            data: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> PersistedState {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self) -> Result<PersistedState> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        Ok(())
    }
}
