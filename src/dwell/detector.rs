use serde::Serialize;
use std::time::{Duration, Instant};

use crate::{
    geo::{distance_meters, Coordinate},
    settings::DwellSettings,
};

use super::state::{DwellPhase, DwellState, DwellStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellConfig {
    pub threshold: Duration,
    pub radius_meters: f64,
    pub enabled: bool,
}

impl Default for DwellConfig {
    fn default() -> Self {
        DwellConfig::from(&DwellSettings::default())
    }
}

impl From<&DwellSettings> for DwellConfig {
    fn from(settings: &DwellSettings) -> Self {
        Self {
            threshold: Duration::from_secs(settings.dwell_threshold_secs),
            radius_meters: settings.dwell_radius_meters,
            enabled: settings.dwell_enabled,
        }
    }
}

/// Fired once per anchor when the user has stayed put long enough.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DwellEvent {
    pub anchor: Coordinate,
    pub elapsed_secs: f64,
}

/// Pure dwell state machine. Time is passed in, so it runs the same under a
/// real ticker, a replay loop or a test.
#[derive(Debug, Clone)]
pub struct DwellDetector {
    config: DwellConfig,
    state: Option<DwellState>,
}

impl DwellDetector {
    pub fn new(config: DwellConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &DwellConfig {
        &self.config
    }

    /// Takes effect on the next sample or tick. Disabling discards the stay.
    pub fn set_config(&mut self, config: DwellConfig) {
        if !config.enabled {
            self.state = None;
        }
        self.config = config;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.set_config(DwellConfig {
            enabled,
            ..self.config
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn state(&self) -> Option<&DwellState> {
        self.state.as_ref()
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.state.as_ref().map(|state| state.elapsed(now))
    }

    pub fn on_sample(&mut self, sample: Coordinate, now: Instant) -> Option<DwellEvent> {
        if !self.config.enabled {
            return None;
        }

        let Some(state) = self.state.as_mut() else {
            log_debug!(
                "dwell anchor set at ({:.5}, {:.5})",
                sample.latitude,
                sample.longitude
            );
            self.state = Some(DwellState::anchored(sample, now));
            return None;
        };

        state.last_sample_at = now;
        let distance = distance_meters(&state.anchor, &sample);

        // NaN distance compares false and re-anchors
        if distance < self.config.radius_meters {
            return self.evaluate(now);
        }

        log_debug!(
            "moved {:.0}m (radius {:.0}m); re-anchoring after {}s",
            distance,
            self.config.radius_meters,
            state.elapsed(now).as_secs()
        );
        state.reanchor(sample, now);
        None
    }

    /// Periodic re-check so a dwell fires without waiting for a fresh sample.
    pub fn tick(&mut self, now: Instant) -> Option<DwellEvent> {
        if !self.config.enabled {
            return None;
        }
        self.evaluate(now)
    }

    pub fn status(&self, now: Instant) -> DwellStatus {
        if !self.config.enabled {
            return DwellStatus::disabled();
        }

        match &self.state {
            None => DwellStatus {
                phase: DwellPhase::Idle,
                ..DwellStatus::default()
            },
            Some(state) => DwellStatus {
                phase: DwellPhase::Dwelling,
                anchor: Some(state.anchor),
                elapsed_secs: state.elapsed(now).as_secs(),
                notified: state.notified,
                last_error: None,
            },
        }
    }

    fn evaluate(&mut self, now: Instant) -> Option<DwellEvent> {
        let threshold = self.config.threshold;
        let state = self.state.as_mut()?;
        if state.notified {
            return None;
        }

        let elapsed = state.elapsed(now);
        if elapsed < threshold {
            return None;
        }

        state.notified = true;
        log_info!(
            "dwell detected at ({:.5}, {:.5}) after {}s",
            state.anchor.latitude,
            state.anchor.longitude,
            elapsed.as_secs()
        );
        Some(DwellEvent {
            anchor: state.anchor,
            elapsed_secs: elapsed.as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DwellConfig {
        DwellConfig {
            threshold: Duration::from_secs(300),
            radius_meters: 30.0,
            enabled: true,
        }
    }

    fn origin() -> Coordinate {
        Coordinate::new(40.7484, -73.9857)
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_first_sample_anchors_without_firing() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());

        assert_eq!(detector.status(base).phase, DwellPhase::Idle);
        assert!(detector.on_sample(origin(), base).is_none());

        let state = detector.state().unwrap();
        assert_eq!(state.anchor, origin());
        assert!(!state.notified);
        assert_eq!(detector.status(base).phase, DwellPhase::Dwelling);
    }

    #[test]
    fn test_threshold_crossed_by_tick() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());
        let x = origin();

        assert!(detector.on_sample(x, base).is_none());
        assert!(detector.on_sample(x.offset_meters(6.0, 8.0), at(base, 60)).is_none());
        assert!(detector.tick(at(base, 299)).is_none());

        let event = detector.tick(at(base, 300)).unwrap();
        assert_eq!(event.anchor, x);
        assert_eq!(event.elapsed_secs, 300.0);

        assert!(detector.on_sample(x.offset_meters(-5.0, 5.0), at(base, 310)).is_none());
        assert!(detector.tick(at(base, 400)).is_none());
    }

    #[test]
    fn test_threshold_crossed_by_late_sample() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());
        let x = origin();

        detector.on_sample(x, base);
        detector.on_sample(x.offset_meters(6.0, 8.0), at(base, 60));

        let event = detector
            .on_sample(x.offset_meters(-6.0, 8.0), at(base, 310))
            .unwrap();
        assert_eq!(event.anchor, x);
        assert!((300.0..=310.0).contains(&event.elapsed_secs));
    }

    #[test]
    fn test_fires_once_per_anchor() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());
        let x = origin();

        let mut fired = 0;
        for secs in (0..=900).step_by(15) {
            if detector.on_sample(x.offset_meters(3.0, 0.0), at(base, secs)).is_some() {
                fired += 1;
            }
            if detector.tick(at(base, secs + 1)).is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_movement_resets_anchor() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());
        let x = origin();
        let y = x.offset_meters(100.0, 0.0);

        detector.on_sample(x, base);
        assert!(detector.on_sample(y, at(base, 60)).is_none());

        assert_eq!(detector.state().unwrap().anchor, y);
        assert_eq!(detector.elapsed(at(base, 61)), Some(Duration::from_secs(1)));
        assert!(detector.tick(at(base, 300)).is_none());
    }

    #[test]
    fn test_movement_after_fire_clears_notified() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());
        let x = origin();
        let y = x.offset_meters(0.0, 250.0);

        detector.on_sample(x, base);
        assert!(detector.tick(at(base, 300)).is_some());
        assert!(detector.state().unwrap().notified);

        detector.on_sample(y, at(base, 400));
        let state = detector.state().unwrap();
        assert!(!state.notified);
        assert_eq!(detector.elapsed(at(base, 400)), Some(Duration::ZERO));

        let event = detector.tick(at(base, 700)).unwrap();
        assert_eq!(event.anchor, y);
    }

    #[test]
    fn test_sample_outside_radius_reanchors() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(DwellConfig {
            radius_meters: 50.0,
            ..config()
        });
        let x = origin();

        detector.on_sample(x, base);
        detector.on_sample(x.offset_meters(55.0, 0.0), at(base, 10));
        assert_ne!(detector.state().unwrap().anchor, x);
    }

    #[test]
    fn test_disable_discards_state_and_ignores_samples() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());

        detector.on_sample(origin(), base);
        detector.set_enabled(false);
        assert!(detector.state().is_none());
        assert_eq!(detector.status(base).phase, DwellPhase::Disabled);

        assert!(detector.on_sample(origin(), at(base, 400)).is_none());
        assert!(detector.tick(at(base, 800)).is_none());
        assert!(detector.state().is_none());

        detector.set_enabled(true);
        assert!(detector.on_sample(origin(), at(base, 900)).is_none());
        assert!(detector.tick(at(base, 1100)).is_none());
        assert!(detector.tick(at(base, 1200)).is_some());
    }

    #[test]
    fn test_nan_sample_reanchors() {
        let base = Instant::now();
        let mut detector = DwellDetector::new(config());

        detector.on_sample(origin(), base);
        detector.on_sample(Coordinate::new(f64::NAN, 0.0), at(base, 5));
        assert!(detector.state().unwrap().anchor.latitude.is_nan());
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = DwellSettings::default();
        settings.dwell_threshold_secs = 90;
        settings.dwell_radius_meters = 12.5;
        settings.dwell_enabled = false;

        let config = DwellConfig::from(&settings);
        assert_eq!(config.threshold, Duration::from_secs(90));
        assert_eq!(config.radius_meters, 12.5);
        assert!(!config.enabled);
    }
}
