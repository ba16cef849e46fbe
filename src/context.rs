use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;

use crate::settings::{DwellSettings, MemoryPersistence, PersistedState, StatePersistence};

/// Shared settings and cooldown bookkeeping for the monitor and the gate.
///
/// Cheap to clone; every clone sees the same state. Writes go through the
/// persistence port before returning.
#[derive(Clone)]
pub struct DwellContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    state: RwLock<PersistedState>,
    persistence: Arc<dyn StatePersistence>,
}

impl DwellContext {
    pub fn load(persistence: Arc<dyn StatePersistence>) -> Result<Self> {
        let state = persistence.load()?;
        state.settings.validate()?;
        Ok(Self {
            inner: Arc::new(ContextInner {
                state: RwLock::new(state),
                persistence,
            }),
        })
    }

    /// Context backed by memory only.
    pub fn ephemeral(settings: DwellSettings) -> Self {
        let state = PersistedState {
            settings,
            last_notification_at: None,
        };
        Self {
            inner: Arc::new(ContextInner {
                state: RwLock::new(state.clone()),
                persistence: Arc::new(MemoryPersistence::new(state)),
            }),
        }
    }

    pub fn settings(&self) -> DwellSettings {
        self.read().settings.clone()
    }

    pub fn last_notification_at(&self) -> Option<i64> {
        self.read().last_notification_at
    }

    pub fn update_settings(&self, settings: DwellSettings) -> Result<()> {
        settings.validate()?;
        self.mutate(|state| state.settings = settings)
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate(|state| state.settings.notifications_enabled = enabled)
    }

    pub fn set_dwell_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate(|state| state.settings.dwell_enabled = enabled)
    }

    /// Stamps the cooldown window. The in-memory value is updated even if the
    /// save fails, so a broken disk cannot cause repeat notifications.
    pub fn record_notification(&self, at_ms: i64) -> Result<()> {
        self.mutate(|state| state.last_notification_at = Some(at_ms))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PersistedState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, apply: impl FnOnce(&mut PersistedState)) -> Result<()> {
        let mut guard = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
        self.inner.persistence.save(&guard)
    }
}
