use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_V1: &str = include_str!("schemas/schema_v1.sql");

/// Creates the history schema on a fresh file; refuses unknown versions.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read history schema version")?;

    match version {
        SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA_V1)
                .context("failed to create notifications table")?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit().context("failed to commit history schema")?;
            info!("created notification history schema v{SCHEMA_VERSION}");
            Ok(())
        }
        other => bail!("history schema v{other} is not supported (expected v{SCHEMA_VERSION})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_created_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'notifications'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
