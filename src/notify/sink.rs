use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::error;
use tokio::sync::mpsc;

use crate::{db::Database, models::Notification};

/// Where generated notifications go. Display is entirely the sink's business.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Forwards notifications to a channel, e.g. a UI event bus.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| anyhow!("notification receiver dropped"))
    }
}

/// Appends every notification to the SQLite history.
pub struct HistorySink {
    db: Database,
}

impl HistorySink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for HistorySink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.db.insert_notification(notification).await
    }
}

/// Delivers to every inner sink; one failing does not stop the others.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(err) = sink.deliver(notification).await {
                error!("notification sink failed for {}: {err:?}", notification.id);
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(anyhow!(
                "{failures} of {} notification sinks failed",
                self.sinks.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geo::Coordinate,
        models::{Card, Merchant},
    };

    fn notification() -> Notification {
        Notification {
            id: "n-1".to_string(),
            merchant: Merchant {
                id: "m".to_string(),
                name: "Cafe".to_string(),
                category: "dining".to_string(),
                location: Coordinate::new(0.0, 0.0),
                address: None,
                estimated_spend: None,
            },
            recommended_card: Card::new("c", "Card"),
            reason: "Best rewards for dining".to_string(),
            estimated_earnings: "$0.30 cash back".to_string(),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_fanout_continues_past_failures() {
        let (closed, closed_rx) = ChannelSink::new();
        drop(closed_rx);
        let (open, mut open_rx) = ChannelSink::new();

        let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(closed), Arc::new(open)];
        let fanout = FanoutSink::new(sinks);
        assert!(fanout.deliver(&notification()).await.is_err());
        assert_eq!(open_rx.recv().await.unwrap().id, "n-1");
    }

    #[tokio::test]
    async fn test_history_sink_records() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("h.sqlite3")).unwrap();
        let sink = HistorySink::new(db.clone());

        sink.deliver(&notification()).await.unwrap();
        assert_eq!(db.list_recent_notifications(5).await.unwrap().len(), 1);
    }
}
