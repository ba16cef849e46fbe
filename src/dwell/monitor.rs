use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::info;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    context::DwellContext,
    location::{LocationEvent, LocationReceiver, LocationSource},
};

use super::{DwellConfig, DwellDetector, DwellEvent, DwellStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Receives dwell events from the monitor loop.
///
/// Called inline on the loop, so implementations must hand slow work off to
/// their own task. `cancel` fires when the monitor stops.
pub trait DwellHandler: Send + Sync + 'static {
    fn on_dwell(self: Arc<Self>, event: DwellEvent, cancel: CancellationToken);
}

impl<F> DwellHandler for F
where
    F: Fn(DwellEvent, CancellationToken) + Send + Sync + 'static,
{
    fn on_dwell(self: Arc<Self>, event: DwellEvent, cancel: CancellationToken) {
        (*self)(event, cancel)
    }
}

struct MonitorWorker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the location subscription and the 1 Hz ticker around a [`DwellDetector`].
///
/// Samples and ticks are handled on one task, so they never race on the
/// detector's `notified` flag.
pub struct DwellMonitor {
    context: DwellContext,
    handler: Arc<dyn DwellHandler>,
    status_tx: watch::Sender<DwellStatus>,
    worker: Mutex<Option<MonitorWorker>>,
    tick_interval: Duration,
    heartbeat_every_ticks: u32,
}

impl DwellMonitor {
    pub fn new(context: DwellContext, handler: Arc<dyn DwellHandler>) -> Self {
        let debug_mode = std::env::var("SWIPERIGHT_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let (status_tx, _) = watch::channel(DwellStatus::disabled());

        Self {
            context,
            handler,
            status_tx,
            worker: Mutex::new(None),
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DwellStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> DwellStatus {
        self.status_tx.borrow().clone()
    }

    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Subscribes to `source` and starts tracking from a fresh Idle state.
    ///
    /// With dwell disabled the monitor still starts, holds no subscription,
    /// and subscribes once `dwell_enabled` turns back on.
    pub async fn start(&self, source: Arc<dyn LocationSource>) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                bail!("dwell monitor already active");
            }
        }

        // Subscribe before returning so fixes pushed right after start land.
        let initial = if self.context.settings().dwell_enabled {
            Some(source.subscribe().context("failed to subscribe to locations")?)
        } else {
            None
        };

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(monitor_loop(
            MonitorLoop {
                context: self.context.clone(),
                handler: self.handler.clone(),
                source,
                status_tx: self.status_tx.clone(),
                cancel_token: cancel_token.clone(),
                heartbeat_every: self.heartbeat_every_ticks,
            },
            initial,
            self.tick_interval,
        ));

        info!("dwell monitor started");
        *worker = Some(MonitorWorker {
            handle,
            cancel_token,
        });
        Ok(())
    }

    /// Stops the loop and drops the location subscription. In-flight handler
    /// work sees its token cancelled.
    pub async fn stop(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };

        worker.cancel_token.cancel();
        worker
            .handle
            .await
            .context("dwell monitor task failed to join")
    }
}

struct MonitorLoop {
    context: DwellContext,
    handler: Arc<dyn DwellHandler>,
    source: Arc<dyn LocationSource>,
    status_tx: watch::Sender<DwellStatus>,
    cancel_token: CancellationToken,
    heartbeat_every: u32,
}

enum StreamEnd {
    Cancelled,
    Disabled,
    Closed,
}

async fn monitor_loop(
    params: MonitorLoop,
    mut initial: Option<LocationReceiver>,
    tick_interval: Duration,
) {
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let locations = match initial.take() {
            Some(locations) => locations,
            None if params.context.settings().dwell_enabled => match params.source.subscribe() {
                Ok(locations) => {
                    log_info!("dwell detection enabled; location stream resubscribed");
                    locations
                }
                Err(err) => {
                    log_error!("location subscribe failed, retrying: {err:?}");
                    if !wait_tick(&params.cancel_token, &mut ticker).await {
                        break;
                    }
                    continue;
                }
            },
            None => {
                // Disabled: hold no subscription, just watch the setting.
                params.status_tx.send_replace(DwellStatus::disabled());
                if !wait_tick(&params.cancel_token, &mut ticker).await {
                    break;
                }
                continue;
            }
        };

        match track(&params, locations, &mut ticker).await {
            StreamEnd::Disabled => continue,
            StreamEnd::Cancelled | StreamEnd::Closed => break,
        }
    }

    params.status_tx.send_replace(DwellStatus::disabled());
}

/// False once the monitor is cancelled.
async fn wait_tick(cancel_token: &CancellationToken, ticker: &mut time::Interval) -> bool {
    tokio::select! {
        _ = cancel_token.cancelled() => false,
        _ = ticker.tick() => true,
    }
}

/// Runs one subscription from Idle until it is cancelled, disabled or closed.
/// Dropping `locations` on return is the unsubscribe.
async fn track(
    params: &MonitorLoop,
    mut locations: LocationReceiver,
    ticker: &mut time::Interval,
) -> StreamEnd {
    let MonitorLoop {
        context,
        handler,
        status_tx,
        cancel_token,
        heartbeat_every,
        ..
    } = params;

    let mut detector = DwellDetector::new(DwellConfig::from(&context.settings()));
    let mut ticks: u32 = 0;
    let mut last_error = None;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("dwell monitor shutting down");
                return StreamEnd::Cancelled;
            }
            _ = ticker.tick() => {
                detector.set_config(DwellConfig::from(&context.settings()));
                if !detector.is_enabled() {
                    log_info!("dwell detection disabled; releasing location stream");
                    return StreamEnd::Disabled;
                }

                let now = Instant::now().into_std();
                if let Some(event) = detector.tick(now) {
                    dispatch(handler, event, cancel_token);
                }

                let mut status = detector.status(now);
                status.last_error = last_error.clone();

                ticks = ticks.wrapping_add(1);
                if ticks % *heartbeat_every == 0 {
                    log_debug!(
                        "dwell heartbeat: {:?}, {}s at anchor, notified={}",
                        status.phase,
                        status.elapsed_secs,
                        status.notified
                    );
                }
                status_tx.send_replace(status);
            }
            event = locations.recv() => {
                match event {
                    Some(LocationEvent::Sample(sample)) => {
                        detector.set_config(DwellConfig::from(&context.settings()));
                        let now = Instant::now().into_std();
                        if let Some(event) = detector.on_sample(sample, now) {
                            dispatch(handler, event, cancel_token);
                        }
                        last_error = None;
                    }
                    Some(LocationEvent::Error(err)) => {
                        // The anchor survives transient GPS failures.
                        log_warn!("location error: {err}");
                        last_error = Some(err);
                    }
                    None => {
                        log_info!("location stream closed; dwell monitor exiting");
                        return StreamEnd::Closed;
                    }
                }

                let mut status = detector.status(Instant::now().into_std());
                status.last_error = last_error.clone();
                status_tx.send_replace(status);
            }
        }
    }
}

fn dispatch(handler: &Arc<dyn DwellHandler>, event: DwellEvent, cancel_token: &CancellationToken) {
    handler.clone().on_dwell(event, cancel_token.child_token());
}
