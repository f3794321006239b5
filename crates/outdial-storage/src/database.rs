// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread, which makes every `call` closure an atomic unit against the
//! database. Do NOT create additional Connection instances for writes.

use chrono::{DateTime, SecondsFormat, Utc};
use outdial_core::OutdialError;
use tracing::debug;

use crate::migrations;

/// Handle to the single-writer SQLite connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`, applies pragmas, and runs
    /// pending migrations.
    ///
    /// `synchronous=FULL` keeps the durability contract: a mutation reported
    /// as successful is observable after a crash.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, OutdialError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;

        conn.call(move |conn| {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "synchronous", "FULL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(&self) -> Result<(), OutdialError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Converts a tokio-rusqlite error into the storage error variant.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> OutdialError {
    OutdialError::Storage {
        source: Box::new(e),
    }
}

/// Formats a timestamp as a fixed-width RFC 3339 UTC string.
///
/// Fixed fractional width keeps lexicographic order equal to
/// chronological order, which the queue indices rely on.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`fmt_ts`].
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, OutdialError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OutdialError::Storage {
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let s = fmt_ts(ts);
        assert_eq!(parse_ts(&s).unwrap(), ts);
    }

    #[test]
    fn timestamp_order_is_lexicographic() {
        let early = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(fmt_ts(early) < fmt_ts(late));
    }

    #[tokio::test]
    async fn open_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row("SELECT COUNT(*) FROM call_jobs", [], |row| row.get(0))?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
        db.close().await.unwrap();
    }
}
