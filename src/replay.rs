//! Offline replay of recorded location traces.
//!
//! Drives a [`DwellDetector`] one synthetic second at a time and feeds every
//! dwell through a [`NotificationGate`] backed by the trace's own merchants.

use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    context::DwellContext,
    dwell::{DwellConfig, DwellDetector, DwellEvent},
    geo::Coordinate,
    lookup::StaticLookup,
    models::{Card, Merchant, Notification},
    notify::{GateOutcome, NotificationGate, NotificationSink},
    rewards::CardCatalog,
    settings::DwellSettings,
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    #[serde(default)]
    pub settings: Option<DwellSettings>,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub held_card_ids: Vec<String>,
    #[serde(default)]
    pub merchants: Vec<Merchant>,
    pub samples: Vec<TraceSample>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSample {
    pub offset_secs: u64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl TraceSample {
    fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
        }
    }
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid trace {}", path.display()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// Dwell events the detector fired, notified or not.
    pub dwells: usize,
    pub notifications: Vec<Notification>,
}

/// Replays `trace` from second 0 through its last sample plus `tail_secs`.
///
/// Each second applies the samples due by then before the tick, so a move
/// recorded at second N re-anchors before a dwell at N can fire. Second N
/// maps to wall clock `start_ms + N * 1000`.
pub async fn replay_trace(
    mut trace: Trace,
    sink: Arc<dyn NotificationSink>,
    start_ms: i64,
    tail_secs: u64,
) -> Result<ReplayReport> {
    trace.samples.sort_by_key(|sample| sample.offset_secs);

    let settings = trace.settings.take().unwrap_or_default();
    settings.validate()?;

    let catalog = CardCatalog::new(trace.cards).with_held(trace.held_card_ids);
    let gate = NotificationGate::new(
        DwellContext::ephemeral(settings.clone()),
        Arc::new(StaticLookup::new(trace.merchants)),
        sink,
        catalog,
    );

    let mut detector = DwellDetector::new(DwellConfig::from(&settings));
    let cancel = CancellationToken::new();
    let base = Instant::now();
    let last_offset = trace.samples.last().map_or(0, |sample| sample.offset_secs);
    let mut samples = trace.samples.iter().peekable();
    let mut report = ReplayReport::default();

    for second in 0..=last_offset.saturating_add(tail_secs) {
        let now = base + Duration::from_secs(second);
        let mut events: Vec<DwellEvent> = Vec::new();

        while let Some(sample) = samples.next_if(|sample| sample.offset_secs <= second) {
            events.extend(detector.on_sample(sample.coordinate(), now));
        }
        events.extend(detector.tick(now));

        let now_ms = start_ms.saturating_add(i64::try_from(second).unwrap_or(i64::MAX).saturating_mul(1000));
        for event in events {
            report.dwells += 1;
            match gate.evaluate_at(&event, now_ms, &cancel).await {
                GateOutcome::Emitted(notification) => report.notifications.push(notification),
                outcome => log_info!("t={second}s dwell without notification: {outcome:?}"),
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelSink;

    const START_MS: i64 = 1_760_000_000_000;

    fn trace(json: &str) -> Trace {
        serde_json::from_str(json).unwrap()
    }

    const FUEL_STOP: &str = r#"{
        "cards": [{"id": "fuel", "name": "Fuel Card", "rewardRates": {"gas": "2%"}}],
        "merchants": [{
            "id": "shell",
            "name": "Shell",
            "category": "gas",
            "location": {"latitude": 0.0001, "longitude": 0.0},
            "estimatedSpend": 40
        }],
        "samples": [
            {"offsetSecs": 0, "latitude": 0.0, "longitude": 0.0},
            {"offsetSecs": 100, "latitude": 0.00005, "longitude": 0.0},
            {"offsetSecs": 200, "latitude": 0.0, "longitude": 0.00005}
        ]
    }"#;

    #[tokio::test]
    async fn test_dwell_fires_on_tick_after_last_sample() {
        let (sink, mut rx) = ChannelSink::new();
        let report = replay_trace(trace(FUEL_STOP), Arc::new(sink), START_MS, 150)
            .await
            .unwrap();

        assert_eq!(report.dwells, 1);
        assert_eq!(report.notifications.len(), 1);
        let notification = &report.notifications[0];
        assert_eq!(notification.timestamp, START_MS + 300_000);
        assert_eq!(notification.recommended_card.id, "fuel");
        assert_eq!(notification.estimated_earnings, "$0.80 cash back");
        assert_eq!(rx.recv().await.unwrap(), *notification);
    }

    #[tokio::test]
    async fn test_without_tail_trace_ends_before_threshold() {
        let (sink, _rx) = ChannelSink::new();
        let report = replay_trace(trace(FUEL_STOP), Arc::new(sink), START_MS, 0)
            .await
            .unwrap();

        assert_eq!(report.dwells, 0);
        assert!(report.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_sample_applies_before_tick_in_same_second() {
        let json = r#"{
            "cards": [{"id": "fuel", "name": "Fuel Card", "rewardRates": {"gas": "2%"}}],
            "merchants": [{
                "id": "shell", "name": "Shell", "category": "gas",
                "location": {"latitude": 0.0001, "longitude": 0.0}
            }],
            "samples": [
                {"offsetSecs": 0, "latitude": 0.0, "longitude": 0.0},
                {"offsetSecs": 300, "latitude": 0.01, "longitude": 0.0}
            ]
        }"#;

        let (sink, _rx) = ChannelSink::new();
        let report = replay_trace(trace(json), Arc::new(sink), START_MS, 0)
            .await
            .unwrap();
        assert_eq!(report.dwells, 0);

        // Staying at the new spot dwells there, but no merchant is nearby.
        let (sink, _rx) = ChannelSink::new();
        let report = replay_trace(trace(json), Arc::new(sink), START_MS, 300)
            .await
            .unwrap();
        assert_eq!(report.dwells, 1);
        assert!(report.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_trace_settings_and_cooldown() {
        let json = r#"{
            "settings": {"dwellThresholdSecs": 60, "cooldownMs": 600000},
            "cards": [{"id": "dine", "name": "Dining Card", "rewardRates": {"dining": 0.03}}],
            "merchants": [
                {"id": "cafe", "name": "Cafe", "category": "dining",
                 "location": {"latitude": 0.0, "longitude": 0.0}},
                {"id": "bistro", "name": "Bistro", "category": "dining",
                 "location": {"latitude": 0.01, "longitude": 0.0}}
            ],
            "samples": [
                {"offsetSecs": 0, "latitude": 0.0, "longitude": 0.0},
                {"offsetSecs": 90, "latitude": 0.01, "longitude": 0.0},
                {"offsetSecs": 180, "latitude": 0.01, "longitude": 0.0}
            ]
        }"#;

        let (sink, _rx) = ChannelSink::new();
        let report = replay_trace(trace(json), Arc::new(sink), START_MS, 0)
            .await
            .unwrap();

        assert_eq!(report.dwells, 2);
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].merchant.id, "cafe");
        assert_eq!(report.notifications[0].timestamp, START_MS + 60_000);
    }

    #[tokio::test]
    async fn test_invalid_trace_settings_rejected() {
        let json = r#"{"settings": {"dwellRadiusMeters": 0}, "samples": []}"#;
        let (sink, _rx) = ChannelSink::new();
        assert!(replay_trace(trace(json), Arc::new(sink), START_MS, 0)
            .await
            .is_err());
    }
}
