use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};

use swiperight::{
    db::Database,
    init_logging,
    models::Notification,
    notify::{FanoutSink, HistorySink, NotificationSink},
    replay::{replay_trace, Trace},
};

#[derive(Parser)]
#[command(name = "swiperight-replay")]
#[command(about = "Replay recorded location traces through the dwell detector and reward gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON trace and print every notification it produces
    Replay {
        trace: PathBuf,
        /// Also append notifications to this SQLite history
        #[arg(long)]
        history: Option<PathBuf>,
        /// Wall-clock start of the trace in epoch ms (defaults to now)
        #[arg(long)]
        start_ms: Option<i64>,
        /// Keep ticking this many seconds after the last sample
        #[arg(long, default_value_t = 0)]
        tail_secs: u64,
    },
    /// Print the most recent notifications from a history database
    History {
        db: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Prints each notification as one JSON line.
struct StdoutSink;

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        println!("{}", serde_json::to_string(notification)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            trace,
            history,
            start_ms,
            tail_secs,
        } => {
            let start_ms = start_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
            let emitted = replay(&trace, history, start_ms, tail_secs).await?;
            log::info!("replay finished with {emitted} notification(s)");
        }
        Commands::History { db, limit } => {
            let database = Database::new(db)?;
            for notification in database.list_recent_notifications(limit).await? {
                println!("{}", serde_json::to_string(&notification)?);
            }
        }
    }

    Ok(())
}

async fn replay(
    path: &Path,
    history: Option<PathBuf>,
    start_ms: i64,
    tail_secs: u64,
) -> Result<usize> {
    let mut trace = Trace::load(path)?;
    trace.settings = Some(trace.settings.take().unwrap_or_default().with_env_overrides()?);

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(StdoutSink)];
    if let Some(history) = history {
        sinks.push(Arc::new(HistorySink::new(Database::new(history)?)));
    }

    let report = replay_trace(trace, Arc::new(FanoutSink::new(sinks)), start_ms, tail_secs)
        .await
        .with_context(|| format!("replay of {} failed", path.display()))?;
    log::info!("{} dwell(s) detected", report.dwells);
    Ok(report.notifications.len())
}
