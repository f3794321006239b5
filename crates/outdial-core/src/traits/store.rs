// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store trait: durable job records, priority queues, scheduled
//! index, and the active set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{CallJob, CallPriority, CallStatus, JobPatch, QueueCounts};

/// Result of an insert-or-ignore [`StateStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// A job with this id already exists; nothing was written.
    Exists,
}

/// An entry of the active set, as seen by the sweeper.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEntry {
    pub job: CallJob,
    /// When a worker claimed the job out of its queue.
    pub claimed_at: DateTime<Utc>,
}

/// Durable, crash-tolerant storage for [`CallJob`] records and the three
/// queue indices.
///
/// Every mutation is durable before the call returns. `pop_ready`,
/// `promote_due`, and `update` are individually atomic; `put` is
/// idempotent on the job id. Status transitions are monotonic: an update
/// that would overwrite a terminal status fails with
/// [`OutdialError::TerminalState`](crate::OutdialError::TerminalState).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert-or-ignore on the job id.
    async fn put(&self, job: &CallJob) -> Result<PutOutcome>;

    async fn get(&self, id: &str) -> Result<Option<CallJob>>;

    /// Appends the job to its priority queue. The job must exist and be Pending.
    async fn enqueue(&self, id: &str, priority: CallPriority) -> Result<()>;

    /// Adds the job to the scheduled index and marks it Scheduled.
    async fn schedule(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Atomically moves up to `n` queued ids into the active set, draining
    /// strictly higher-priority queues first and FIFO within a queue.
    /// Claimed jobs transition to Dispatching. Callers must not pop while
    /// the active set is at capacity.
    async fn pop_ready(&self, n: usize) -> Result<Vec<String>>;

    /// Moves every scheduled id with fire time `<= now` back to Pending and
    /// into its priority queue. Returns the promoted ids.
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<String>>;

    /// Merges `patch` into the record. Rejects terminal-status overwrites.
    async fn update(&self, id: &str, patch: JobPatch) -> Result<()>;

    /// Removes the id from the active set after a terminal transition.
    async fn release(&self, id: &str) -> Result<()>;

    /// Snapshot of the active set for the sweeper.
    async fn scan_active(&self) -> Result<Vec<ActiveEntry>>;

    async fn active_count(&self) -> Result<u64>;

    /// Removes a still-queued (Pending or Scheduled) job from its index and
    /// marks it Cancelled. Returns false when the job was not cancellable
    /// (already claimed, terminal, or unknown).
    async fn cancel_queued(&self, id: &str) -> Result<bool>;

    /// All jobs for a campaign, optionally filtered by status.
    async fn list_campaign(
        &self,
        campaign_id: &str,
        status: Option<CallStatus>,
    ) -> Result<Vec<CallJob>>;

    /// Startup crash recovery: every id left in the active set by a dead
    /// process is released and re-enqueued as Pending. Returns the ids.
    async fn requeue_orphans(&self) -> Result<Vec<String>>;

    /// Evicts terminal jobs whose last update is older than `cutoff`.
    /// Returns the number of evicted records.
    async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Queue depths for metrics.
    async fn queue_counts(&self) -> Result<QueueCounts>;

    /// Flushes pending writes and releases the connection.
    async fn close(&self) -> Result<()>;
}
