use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::models::Notification;
use migrations::run_migrations;

enum HistoryRequest {
    Insert {
        notification: Box<Notification>,
        reply: oneshot::Sender<Result<()>>,
    },
    Recent {
        limit: i64,
        reply: oneshot::Sender<Result<Vec<Notification>>>,
    },
}

/// Append-only notification history, served by one SQLite thread.
///
/// Clones share the thread; it exits once the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    requests: mpsc::Sender<HistoryRequest>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(&path)
            .with_context(|| format!("failed to open history at {}", path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }
        run_migrations(&mut conn)?;

        let (requests, inbox) = mpsc::channel();
        thread::Builder::new()
            .name("swiperight-db".into())
            .spawn(move || serve(conn, inbox))
            .context("failed to spawn history thread")?;

        info!("Notification history at {}", path.display());
        Ok(Self {
            requests,
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let notification = Box::new(notification.clone());
        self.request(|reply| HistoryRequest::Insert {
            notification,
            reply,
        })
        .await
    }

    /// Newest first.
    pub async fn list_recent_notifications(&self, limit: usize) -> Result<Vec<Notification>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.request(|reply| HistoryRequest::Recent { limit, reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> HistoryRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .map_err(|_| anyhow!("history thread has stopped"))?;
        response
            .await
            .map_err(|_| anyhow!("history thread dropped the request"))?
    }
}

fn serve(conn: Connection, inbox: mpsc::Receiver<HistoryRequest>) {
    while let Ok(request) = inbox.recv() {
        let delivered = match request {
            HistoryRequest::Insert {
                notification,
                reply,
            } => reply.send(insert(&conn, &notification)).is_ok(),
            HistoryRequest::Recent { limit, reply } => reply.send(recent(&conn, limit)).is_ok(),
        };
        if !delivered {
            error!("history caller went away before its reply");
        }
    }
    info!("History thread shutting down");
}

fn insert(conn: &Connection, record: &Notification) -> Result<()> {
    let created_at = record
        .created_at()
        .ok_or_else(|| anyhow!("timestamp {} out of range", record.timestamp))?;
    conn.execute(
        "INSERT INTO notifications (id, merchant_id, merchant_name, category, card_id, card_name, reason, estimated_earnings, timestamp_ms, created_at, merchant_json, card_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.id,
            record.merchant.id,
            record.merchant.name,
            record.merchant.normalized_category(),
            record.recommended_card.id,
            record.recommended_card.name,
            record.reason,
            record.estimated_earnings,
            record.timestamp,
            created_at.to_rfc3339(),
            serde_json::to_string(&record.merchant)?,
            serde_json::to_string(&record.recommended_card)?,
        ],
    )
    .with_context(|| format!("failed to insert notification {}", record.id))?;
    Ok(())
}

fn recent(conn: &Connection, limit: i64) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, reason, estimated_earnings, timestamp_ms, merchant_json, card_json
         FROM notifications
         ORDER BY timestamp_ms DESC, rowid DESC
         LIMIT ?1",
    )?;

    let mut rows = stmt.query(params![limit])?;
    let mut notifications = Vec::new();
    while let Some(row) = rows.next()? {
        let merchant_json: String = row.get(4)?;
        let card_json: String = row.get(5)?;
        notifications.push(Notification {
            id: row.get(0)?,
            reason: row.get(1)?,
            estimated_earnings: row.get(2)?,
            timestamp: row.get(3)?,
            merchant: serde_json::from_str(&merchant_json)
                .context("corrupt merchant_json in notifications")?,
            recommended_card: serde_json::from_str(&card_json)
                .context("corrupt card_json in notifications")?,
        });
    }
    Ok(notifications)
}
