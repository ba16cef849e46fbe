pub mod context;
pub mod db;
pub mod dwell;
pub mod geo;
pub mod location;
pub mod lookup;
pub mod models;
pub mod notify;
pub mod replay;
pub mod rewards;
pub mod settings;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use context::DwellContext;
use dwell::{DwellHandler, DwellMonitor, DwellStatus};
use location::LocationSource;
use lookup::MerchantLookup;
use notify::{NotificationGate, NotificationSink};
use rewards::CardCatalog;

/// Initialize logging (reads `RUST_LOG`, defaults to info).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Detector, gate and shared context wired together.
pub struct SwipeRight {
    context: DwellContext,
    gate: Arc<NotificationGate>,
    monitor: DwellMonitor,
}

impl SwipeRight {
    pub fn new(
        context: DwellContext,
        lookup: Arc<dyn MerchantLookup>,
        sink: Arc<dyn NotificationSink>,
        catalog: CardCatalog,
    ) -> Self {
        let gate = Arc::new(NotificationGate::new(context.clone(), lookup, sink, catalog));
        Self::with_gate(context, gate)
    }

    pub fn with_gate(context: DwellContext, gate: Arc<NotificationGate>) -> Self {
        let handler: Arc<dyn DwellHandler> = gate.clone();
        let monitor = DwellMonitor::new(context.clone(), handler);
        Self {
            context,
            gate,
            monitor,
        }
    }

    pub fn context(&self) -> &DwellContext {
        &self.context
    }

    pub fn gate(&self) -> &Arc<NotificationGate> {
        &self.gate
    }

    pub fn set_catalog(&self, catalog: CardCatalog) {
        self.gate.set_catalog(catalog);
    }

    pub fn status(&self) -> DwellStatus {
        self.monitor.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DwellStatus> {
        self.monitor.subscribe_status()
    }

    pub async fn is_running(&self) -> bool {
        self.monitor.is_running().await
    }

    pub async fn start(&self, locations: Arc<dyn LocationSource>) -> Result<()> {
        log::info!("SwipeRight dwell monitoring starting");
        self.monitor.start(locations).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.monitor.stop().await
    }
}
