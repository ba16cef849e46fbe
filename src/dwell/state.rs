use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::{geo::Coordinate, location::LocationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DwellPhase {
    Disabled,
    Idle,
    Dwelling,
}

impl Default for DwellPhase {
    fn default() -> Self {
        DwellPhase::Disabled
    }
}

/// The current stay: where it is centered and since when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellState {
    pub anchor: Coordinate,
    pub anchored_at: Instant,
    /// Set once this anchor has fired; cleared only by re-anchoring.
    pub notified: bool,
    pub last_sample_at: Instant,
}

impl DwellState {
    pub fn anchored(sample: Coordinate, now: Instant) -> Self {
        Self {
            anchor: sample,
            anchored_at: now,
            notified: false,
            last_sample_at: now,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.anchored_at)
    }

    pub fn reanchor(&mut self, sample: Coordinate, now: Instant) {
        *self = Self::anchored(sample, now);
    }
}

/// Snapshot published for the live "dwelling for Ns" display.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DwellStatus {
    pub phase: DwellPhase,
    pub anchor: Option<Coordinate>,
    pub elapsed_secs: u64,
    pub notified: bool,
    pub last_error: Option<LocationError>,
}

impl DwellStatus {
    pub fn disabled() -> Self {
        Self::default()
    }
}
