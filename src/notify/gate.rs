use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    context::DwellContext,
    dwell::{DwellEvent, DwellHandler},
    geo::distance_meters,
    lookup::MerchantLookup,
    models::Notification,
    rewards::{estimate_earnings, rank_cards, CardCatalog, ScoringConfig},
};

use super::sink::NotificationSink;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// What the gate decided for one dwell event.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Emitted(Notification),
    NotificationsDisabled,
    EmptyCatalog,
    /// Another evaluation holds the gate.
    Busy,
    CoolingDown { remaining_ms: i64 },
    /// Lookup errored or timed out. Treated as "no merchants" but logged apart.
    LookupFailed,
    NoMerchants,
    NoCard,
    /// Monitor stopped or notifications switched off while the lookup was in flight.
    Cancelled,
}

impl GateOutcome {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            GateOutcome::Emitted(notification) => Some(notification),
            _ => None,
        }
    }
}

struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Turns dwell events into at most one card recommendation per cooldown window.
pub struct NotificationGate {
    context: DwellContext,
    lookup: Arc<dyn MerchantLookup>,
    sink: Arc<dyn NotificationSink>,
    catalog: RwLock<CardCatalog>,
    scoring: ScoringConfig,
    busy: AtomicBool,
    lookup_timeout: Duration,
}

impl NotificationGate {
    pub fn new(
        context: DwellContext,
        lookup: Arc<dyn MerchantLookup>,
        sink: Arc<dyn NotificationSink>,
        catalog: CardCatalog,
    ) -> Self {
        Self {
            context,
            lookup,
            sink,
            catalog: RwLock::new(catalog),
            scoring: ScoringConfig::default(),
            busy: AtomicBool::new(false),
            lookup_timeout: LOOKUP_TIMEOUT,
        }
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn set_catalog(&self, catalog: CardCatalog) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog;
    }

    pub fn catalog(&self) -> CardCatalog {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn evaluate(&self, event: &DwellEvent, cancel: &CancellationToken) -> GateOutcome {
        self.evaluate_at(event, Utc::now().timestamp_millis(), cancel)
            .await
    }

    /// Runs the gate as if the wall clock read `now_ms`.
    pub async fn evaluate_at(
        &self,
        event: &DwellEvent,
        now_ms: i64,
        cancel: &CancellationToken,
    ) -> GateOutcome {
        let settings = self.context.settings();
        if !settings.notifications_enabled {
            log_debug!("notifications disabled; ignoring dwell");
            return GateOutcome::NotificationsDisabled;
        }

        let catalog = self.catalog();
        if catalog.is_empty() {
            log_debug!("card catalog empty; ignoring dwell");
            return GateOutcome::EmptyCatalog;
        }

        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            log_debug!("gate busy; dropping dwell event");
            return GateOutcome::Busy;
        };

        if let Some(last) = self.context.last_notification_at() {
            let cooldown_ms = i64::try_from(settings.cooldown_ms).unwrap_or(i64::MAX);
            // Negative when the clock moved backwards; still inside the window.
            let since = now_ms.saturating_sub(last);
            if since < cooldown_ms {
                let remaining_ms = cooldown_ms.saturating_sub(since);
                log_info!("notification cooldown active ({}s left)", remaining_ms / 1000);
                return GateOutcome::CoolingDown { remaining_ms };
            }
        }

        let anchor = event.anchor;
        let lookup = tokio::time::timeout(
            self.lookup_timeout,
            self.lookup.lookup(
                anchor.latitude,
                anchor.longitude,
                settings.lookup_radius_meters,
            ),
        );

        let merchants = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log_info!("dwell cancelled during merchant lookup");
                return GateOutcome::Cancelled;
            }
            result = lookup => match result {
                Ok(Ok(merchants)) => merchants,
                Ok(Err(err)) => {
                    log_warn!("{} merchant lookup failed: {err:?}", self.lookup.name());
                    return GateOutcome::LookupFailed;
                }
                Err(_) => {
                    log_warn!(
                        "{} merchant lookup timed out (> {}s)",
                        self.lookup.name(),
                        self.lookup_timeout.as_secs()
                    );
                    return GateOutcome::LookupFailed;
                }
            },
        };

        // Results that land after the user switched us off are stale.
        if cancel.is_cancelled() || !self.context.settings().notifications_enabled {
            log_info!("discarding merchant lookup that finished after disablement");
            return GateOutcome::Cancelled;
        }

        let Some(merchant) = merchants.into_iter().min_by(|a, b| {
            distance_meters(&anchor, &a.location).total_cmp(&distance_meters(&anchor, &b.location))
        }) else {
            log_debug!("no merchants near dwell anchor");
            return GateOutcome::NoMerchants;
        };

        let ranked = rank_cards(
            &merchant,
            &catalog.cards,
            &catalog.held_card_ids,
            &self.scoring,
        );
        let Some(best) = ranked.first() else {
            return GateOutcome::NoCard;
        };

        let earnings = estimate_earnings(&merchant, best.card, &self.scoring);
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            reason: format!("Best rewards for {}", merchant.normalized_category()),
            estimated_earnings: earnings.to_string(),
            recommended_card: best.card.clone(),
            merchant,
            timestamp: now_ms,
        };

        if let Err(err) = self.context.record_notification(now_ms) {
            log_error!("failed to persist notification cooldown: {err:?}");
        }

        log_info!(
            "recommending {} at {} ({})",
            notification.recommended_card.name,
            notification.merchant.name,
            notification.estimated_earnings
        );

        if let Err(err) = self.sink.deliver(&notification).await {
            log_error!("notification sink failed: {err:?}");
        }

        GateOutcome::Emitted(notification)
    }
}

impl DwellHandler for NotificationGate {
    fn on_dwell(self: Arc<Self>, event: DwellEvent, cancel: CancellationToken) {
        tokio::spawn(async move {
            let outcome = self.evaluate(&event, &cancel).await;
            if outcome.notification().is_none() {
                log_debug!("dwell produced no notification: {:?}", outcome);
            }
        });
    }
}
