// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StateStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use outdial_config::model::StorageConfig;
use outdial_core::{
    ActiveEntry, CallJob, CallPriority, CallStatus, JobPatch, OutdialError, PutOutcome,
    QueueCounts, StateStore,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed state store.
///
/// Wraps a [`Database`] handle and delegates all operations to the typed
/// query modules. Opening the store runs migrations and applies pragmas.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens (or creates) the store described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, OutdialError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "state store opened");
        Ok(Self { db })
    }

    /// Direct access to the database, for tests.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn put(&self, job: &CallJob) -> Result<PutOutcome, OutdialError> {
        queries::jobs::put(&self.db, job).await
    }

    async fn get(&self, id: &str) -> Result<Option<CallJob>, OutdialError> {
        queries::jobs::get(&self.db, id).await
    }

    async fn enqueue(&self, id: &str, priority: CallPriority) -> Result<(), OutdialError> {
        queries::queue::enqueue(&self.db, id, priority).await
    }

    async fn schedule(&self, id: &str, at: DateTime<Utc>) -> Result<(), OutdialError> {
        queries::queue::schedule(&self.db, id, at).await
    }

    async fn pop_ready(&self, n: usize) -> Result<Vec<String>, OutdialError> {
        queries::queue::pop_ready(&self.db, n).await
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<String>, OutdialError> {
        queries::queue::promote_due(&self.db, now).await
    }

    async fn update(&self, id: &str, patch: JobPatch) -> Result<(), OutdialError> {
        queries::jobs::update(&self.db, id, patch).await
    }

    async fn release(&self, id: &str) -> Result<(), OutdialError> {
        queries::queue::release(&self.db, id).await
    }

    async fn scan_active(&self) -> Result<Vec<ActiveEntry>, OutdialError> {
        queries::queue::scan_active(&self.db).await
    }

    async fn active_count(&self) -> Result<u64, OutdialError> {
        queries::queue::active_count(&self.db).await
    }

    async fn cancel_queued(&self, id: &str) -> Result<bool, OutdialError> {
        queries::queue::cancel_queued(&self.db, id).await
    }

    async fn list_campaign(
        &self,
        campaign_id: &str,
        status: Option<CallStatus>,
    ) -> Result<Vec<CallJob>, OutdialError> {
        queries::jobs::list_campaign(&self.db, campaign_id, status).await
    }

    async fn requeue_orphans(&self) -> Result<Vec<String>, OutdialError> {
        queries::queue::requeue_orphans(&self.db).await
    }

    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OutdialError> {
        queries::jobs::evict_terminal_before(&self.db, cutoff).await
    }

    async fn queue_counts(&self) -> Result<QueueCounts, OutdialError> {
        queries::queue::queue_counts(&self.db).await
    }

    async fn close(&self) -> Result<(), OutdialError> {
        self.db.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("persist.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };

        {
            let store = SqliteStore::open(&config).await.unwrap();
            let job = CallJob::new("p1", "+15550001", "campaign-1");
            store.put(&job).await.unwrap();
            store.enqueue("p1", CallPriority::Normal).await.unwrap();
            store.close().await.unwrap();
        }

        // Indices and records are recoverable exactly after reopen.
        let store = SqliteStore::open(&config).await.unwrap();
        let job = store.get("p1").await.unwrap().unwrap();
        assert_eq!(job.status, CallStatus::Pending);
        assert_eq!(store.queue_counts().await.unwrap().pending.normal, 1);
        assert_eq!(store.pop_ready(1).await.unwrap(), vec!["p1"]);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_trait() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("trait.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        let store = SqliteStore::open(&config).await.unwrap();

        let mut job = CallJob::new("t1", "+15550002", "campaign-2");
        job.priority = CallPriority::Urgent;
        assert_eq!(store.put(&job).await.unwrap(), PutOutcome::Created);
        assert_eq!(store.put(&job).await.unwrap(), PutOutcome::Exists);

        let stored = store.get("t1").await.unwrap().unwrap();
        assert_eq!(stored.priority, CallPriority::Urgent);
        store.close().await.unwrap();
    }
}
