use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl LocationErrorCode {
    /// Maps W3C geolocation error codes (1, 2, 3).
    pub fn from_geolocation_code(code: u16) -> Self {
        match code {
            1 => LocationErrorCode::PermissionDenied,
            3 => LocationErrorCode::Timeout,
            _ => LocationErrorCode::PositionUnavailable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationErrorCode::PermissionDenied => "permission_denied",
            LocationErrorCode::PositionUnavailable => "position_unavailable",
            LocationErrorCode::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationError {
    pub code: LocationErrorCode,
    pub message: String,
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Sample(Coordinate),
    /// Non-fatal; the stream keeps going.
    Error(LocationError),
}

pub type LocationReceiver = mpsc::Receiver<LocationEvent>;

/// Something the dwell monitor can subscribe to for location updates.
///
/// Each call opens a fresh stream; the monitor unsubscribes by dropping the
/// receiver, and may subscribe again later (e.g. when dwell is re-enabled).
pub trait LocationSource: Send + Sync {
    fn subscribe(&self) -> Result<LocationReceiver>;
}

/// In-process location source. The platform layer pushes fixes into it and
/// they reach whichever subscription is current.
#[derive(Clone)]
pub struct LocationFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<LocationEvent>>>,
}

impl LocationFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                capacity: capacity.max(1),
                tx: Mutex::new(None),
            }),
        }
    }

    pub async fn push_sample(&self, sample: Coordinate) -> Result<()> {
        self.push(LocationEvent::Sample(sample)).await
    }

    pub async fn push_error(&self, code: LocationErrorCode, message: impl Into<String>) -> Result<()> {
        self.push(LocationEvent::Error(LocationError {
            code,
            message: message.into(),
        }))
        .await
    }

    pub fn is_subscribed(&self) -> bool {
        self.current().is_some_and(|tx| !tx.is_closed())
    }

    /// Ends the current subscription's stream; the subscriber sees it close.
    pub fn close(&self) {
        self.inner
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn current(&self) -> Option<mpsc::Sender<LocationEvent>> {
        self.inner
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn push(&self, event: LocationEvent) -> Result<()> {
        let Some(tx) = self.current() else {
            bail!("no location subscriber");
        };
        tx.send(event)
            .await
            .map_err(|_| anyhow!("location subscriber has gone away"))
    }
}

impl LocationSource for LocationFeed {
    fn subscribe(&self) -> Result<LocationReceiver> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        *self.inner.tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }
}
