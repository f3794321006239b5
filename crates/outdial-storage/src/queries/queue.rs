// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue index operations: priority queues, scheduled index, active set.
//!
//! Every operation here is one transaction on the single-writer
//! connection, which is what makes `pop_ready` and `promote_due` atomic
//! with respect to each other and to job updates.

use chrono::{DateTime, Utc};
use outdial_core::{ActiveEntry, CallPriority, OutdialError, PendingCounts, QueueCounts};
use rusqlite::params;

use crate::database::{fmt_ts, map_tr_err, parse_ts, Database};
use crate::models::JobRow;

enum EnqueueOutcome {
    Done,
    NotFound,
    BadState(String),
}

/// Appends a Pending job to its priority queue.
pub async fn enqueue(
    db: &Database,
    id: &str,
    priority: CallPriority,
) -> Result<(), OutdialError> {
    let id_owned = id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let status: Option<String> = {
                let mut stmt = tx.prepare("SELECT status FROM call_jobs WHERE id = ?1")?;
                let mut rows = stmt.query(params![id_owned])?;
                match rows.next()? {
                    Some(row) => Some(row.get(0)?),
                    None => None,
                }
            };
            let outcome = match status.as_deref() {
                None => EnqueueOutcome::NotFound,
                Some("pending") => {
                    tx.execute(
                        "INSERT INTO queue_entries (call_id, priority, enqueued_at)
                         VALUES (?1, ?2, ?3)",
                        params![id_owned, priority.rank(), fmt_ts(Utc::now())],
                    )?;
                    EnqueueOutcome::Done
                }
                Some(other) => EnqueueOutcome::BadState(other.to_string()),
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        EnqueueOutcome::Done => Ok(()),
        EnqueueOutcome::NotFound => Err(OutdialError::NotFound {
            call_id: id.to_string(),
        }),
        EnqueueOutcome::BadState(status) => Err(OutdialError::InvalidRequest(format!(
            "cannot enqueue call {id} in state {status}"
        ))),
    }
}

/// Adds the job to the scheduled index and marks it Scheduled.
pub async fn schedule(
    db: &Database,
    id: &str,
    at: DateTime<Utc>,
) -> Result<(), OutdialError> {
    let id_owned = id.to_string();
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = {
                let mut stmt = tx.prepare("SELECT 1 FROM call_jobs WHERE id = ?1")?;
                stmt.exists(params![id_owned])?
            };
            if exists {
                tx.execute(
                    "INSERT OR REPLACE INTO scheduled_calls (call_id, fire_at) VALUES (?1, ?2)",
                    params![id_owned, fmt_ts(at)],
                )?;
                tx.execute(
                    "UPDATE call_jobs SET status = 'scheduled', scheduled_at = ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![fmt_ts(at), fmt_ts(Utc::now()), id_owned],
                )?;
            }
            tx.commit()?;
            Ok(exists)
        })
        .await
        .map_err(map_tr_err)?;

    if found {
        Ok(())
    } else {
        Err(OutdialError::NotFound {
            call_id: id.to_string(),
        })
    }
}

/// Atomically claims up to `n` queued calls into the active set.
///
/// Strictly higher-priority queues drain first; FIFO within a priority.
/// Claimed jobs transition Pending -> Dispatching.
pub async fn pop_ready(db: &Database, n: usize) -> Result<Vec<String>, OutdialError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = fmt_ts(Utc::now());
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT call_id FROM queue_entries
                     ORDER BY priority DESC, seq ASC LIMIT ?1",
                )?;
                let mut rows = stmt.query(params![n as i64])?;
                let mut ids = Vec::new();
                while let Some(row) = rows.next()? {
                    ids.push(row.get::<_, String>(0)?);
                }
                ids
            };
            for id in &ids {
                tx.execute("DELETE FROM queue_entries WHERE call_id = ?1", params![id])?;
                tx.execute(
                    "INSERT INTO active_calls (call_id, claimed_at) VALUES (?1, ?2)",
                    params![id, now],
                )?;
                tx.execute(
                    "UPDATE call_jobs SET status = 'dispatching', updated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
            }
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Moves every scheduled call with fire time `<= now` back to Pending and
/// into its priority queue. Returns the promoted ids.
pub async fn promote_due(db: &Database, now: DateTime<Utc>) -> Result<Vec<String>, OutdialError> {
    let now_str = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let due: Vec<(String, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT s.call_id, j.priority
                     FROM scheduled_calls s JOIN call_jobs j ON j.id = s.call_id
                     WHERE s.fire_at <= ?1
                     ORDER BY s.fire_at ASC",
                )?;
                let mut rows = stmt.query(params![now_str])?;
                let mut due = Vec::new();
                while let Some(row) = rows.next()? {
                    due.push((row.get(0)?, row.get(1)?));
                }
                due
            };
            for (id, priority) in &due {
                tx.execute("DELETE FROM scheduled_calls WHERE call_id = ?1", params![id])?;
                tx.execute(
                    "UPDATE call_jobs SET status = 'pending', updated_at = ?1 WHERE id = ?2",
                    params![now_str, id],
                )?;
                tx.execute(
                    "INSERT INTO queue_entries (call_id, priority, enqueued_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, priority, now_str],
                )?;
            }
            tx.commit()?;
            Ok(due.into_iter().map(|(id, _)| id).collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Removes the id from the active set.
pub async fn release(db: &Database, id: &str) -> Result<(), OutdialError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM active_calls WHERE call_id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Snapshot of the active set with claim times, for the sweeper.
pub async fn scan_active(db: &Database) -> Result<Vec<ActiveEntry>, OutdialError> {
    let rows = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT a.claimed_at, {}
                 FROM active_calls a JOIN call_jobs j ON j.id = a.call_id
                 ORDER BY a.claimed_at ASC",
                JobRow::COLUMNS
                    .split(", ")
                    .map(|c| format!("j.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let claimed_at: String = row.get(0)?;
                let job_row = JobRow {
                    id: row.get(1)?,
                    phone_number: row.get(2)?,
                    campaign_id: row.get(3)?,
                    call_config: row.get(4)?,
                    priority: row.get(5)?,
                    scheduled_at: row.get(6)?,
                    max_retries: row.get(7)?,
                    retry_count: row.get(8)?,
                    status: row.get(9)?,
                    created_at: row.get(10)?,
                    updated_at: row.get(11)?,
                    attempt_log: row.get(12)?,
                    result: row.get(13)?,
                };
                out.push((claimed_at, job_row));
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter()
        .map(|(claimed_at, row)| {
            Ok(ActiveEntry {
                claimed_at: parse_ts(&claimed_at)?,
                job: row.into_job()?,
            })
        })
        .collect()
}

pub async fn active_count(db: &Database) -> Result<u64, OutdialError> {
    db.connection()
        .call(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM active_calls", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Cancels a still-queued job: removes it from whichever index holds it
/// and marks it Cancelled. Returns false when it was not cancellable.
pub async fn cancel_queued(db: &Database, id: &str) -> Result<bool, OutdialError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let from_queue = tx.execute("DELETE FROM queue_entries WHERE call_id = ?1", params![id])?;
            let from_scheduled =
                tx.execute("DELETE FROM scheduled_calls WHERE call_id = ?1", params![id])?;
            let cancelled = from_queue > 0 || from_scheduled > 0;
            if cancelled {
                tx.execute(
                    "UPDATE call_jobs SET status = 'cancelled', updated_at = ?1 WHERE id = ?2",
                    params![fmt_ts(Utc::now()), id],
                )?;
            }
            tx.commit()?;
            Ok(cancelled)
        })
        .await
        .map_err(map_tr_err)
}

/// Startup crash recovery. Every id left in the active set is released;
/// non-terminal ones are re-enqueued as Pending with their own priority.
/// Returns the re-enqueued ids.
pub async fn requeue_orphans(db: &Database) -> Result<Vec<String>, OutdialError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let now = fmt_ts(Utc::now());
            let orphans: Vec<(String, String, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT a.call_id, j.status, j.priority
                     FROM active_calls a JOIN call_jobs j ON j.id = a.call_id",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((row.get(0)?, row.get(1)?, row.get(2)?));
                }
                out
            };
            let mut requeued = Vec::new();
            for (id, status, priority) in orphans {
                tx.execute("DELETE FROM active_calls WHERE call_id = ?1", params![id])?;
                let terminal = matches!(
                    status.as_str(),
                    "completed" | "failed" | "missed" | "cancelled"
                );
                if !terminal {
                    tx.execute(
                        "UPDATE call_jobs SET status = 'pending', updated_at = ?1 WHERE id = ?2",
                        params![now, id],
                    )?;
                    tx.execute(
                        "INSERT INTO queue_entries (call_id, priority, enqueued_at)
                         VALUES (?1, ?2, ?3)",
                        params![id, priority, now],
                    )?;
                    requeued.push(id);
                }
            }
            tx.commit()?;
            Ok(requeued)
        })
        .await
        .map_err(map_tr_err)
}

/// Queue depths for the metrics endpoint.
pub async fn queue_counts(db: &Database) -> Result<QueueCounts, OutdialError> {
    db.connection()
        .call(|conn| {
            let mut pending = PendingCounts::default();
            {
                let mut stmt = conn
                    .prepare("SELECT priority, COUNT(*) FROM queue_entries GROUP BY priority")?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let rank: i64 = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    match rank {
                        1 => pending.low = count as u64,
                        2 => pending.normal = count as u64,
                        3 => pending.high = count as u64,
                        4 => pending.urgent = count as u64,
                        _ => {}
                    }
                }
            }
            let scheduled: i64 =
                conn.query_row("SELECT COUNT(*) FROM scheduled_calls", [], |row| row.get(0))?;
            let active: i64 =
                conn.query_row("SELECT COUNT(*) FROM active_calls", [], |row| row.get(0))?;
            Ok(QueueCounts {
                pending,
                scheduled: scheduled as u64,
                active: active as u64,
            })
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::jobs;
    use outdial_core::{CallJob, CallStatus, JobPatch};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    async fn seed(db: &Database, id: &str, priority: CallPriority) {
        let mut job = CallJob::new(id, "+15550001", "campaign-1");
        job.priority = priority;
        jobs::put(db, &job).await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_and_pop_single() {
        let (db, _dir) = setup_db().await;
        seed(&db, "q1", CallPriority::Normal).await;
        enqueue(&db, "q1", CallPriority::Normal).await.unwrap();

        let popped = pop_ready(&db, 1).await.unwrap();
        assert_eq!(popped, vec!["q1".to_string()]);

        // Claimed: now in the active set, status dispatching, queue empty.
        assert_eq!(active_count(&db).await.unwrap(), 1);
        let job = jobs::get(&db, "q1").await.unwrap().unwrap();
        assert_eq!(job.status, CallStatus::Dispatching);
        assert!(pop_ready(&db, 1).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pop_drains_higher_priorities_first() {
        let (db, _dir) = setup_db().await;
        for (id, priority) in [
            ("low-1", CallPriority::Low),
            ("urgent-1", CallPriority::Urgent),
            ("normal-1", CallPriority::Normal),
            ("urgent-2", CallPriority::Urgent),
        ] {
            seed(&db, id, priority).await;
            enqueue(&db, id, priority).await.unwrap();
        }

        let order: Vec<String> = pop_ready(&db, 4).await.unwrap();
        assert_eq!(order, vec!["urgent-1", "urgent-2", "normal-1", "low-1"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fifo_within_a_priority() {
        let (db, _dir) = setup_db().await;
        for id in ["f1", "f2", "f3"] {
            seed(&db, id, CallPriority::Normal).await;
            enqueue(&db, id, CallPriority::Normal).await.unwrap();
        }
        assert_eq!(pop_ready(&db, 1).await.unwrap(), vec!["f1"]);
        assert_eq!(pop_ready(&db, 1).await.unwrap(), vec!["f2"]);
        assert_eq!(pop_ready(&db, 1).await.unwrap(), vec!["f3"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_requires_pending_job() {
        let (db, _dir) = setup_db().await;
        let err = enqueue(&db, "ghost", CallPriority::Normal).await.unwrap_err();
        assert!(matches!(err, OutdialError::NotFound { .. }));

        seed(&db, "done", CallPriority::Normal).await;
        jobs::update(&db, "done", JobPatch::status(CallStatus::Completed))
            .await
            .unwrap();
        let err = enqueue(&db, "done", CallPriority::Normal).await.unwrap_err();
        assert!(matches!(err, OutdialError::InvalidRequest(_)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scheduled_jobs_are_invisible_until_promoted() {
        let (db, _dir) = setup_db().await;
        seed(&db, "s1", CallPriority::High).await;
        let fire_at = Utc::now() + chrono::Duration::seconds(10);
        schedule(&db, "s1", fire_at).await.unwrap();

        let job = jobs::get(&db, "s1").await.unwrap().unwrap();
        assert_eq!(job.status, CallStatus::Scheduled);

        // Not visible to pop before promotion.
        assert!(pop_ready(&db, 5).await.unwrap().is_empty());

        // Promotion before the fire time moves nothing.
        let promoted = promote_due(&db, Utc::now()).await.unwrap();
        assert!(promoted.is_empty());

        // At fire time the job is promoted to Pending with its own priority.
        let promoted = promote_due(&db, fire_at).await.unwrap();
        assert_eq!(promoted, vec!["s1"]);
        let job = jobs::get(&db, "s1").await.unwrap().unwrap();
        assert_eq!(job.status, CallStatus::Pending);
        assert_eq!(pop_ready(&db, 1).await.unwrap(), vec!["s1"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_removes_from_active_set() {
        let (db, _dir) = setup_db().await;
        seed(&db, "r1", CallPriority::Normal).await;
        enqueue(&db, "r1", CallPriority::Normal).await.unwrap();
        pop_ready(&db, 1).await.unwrap();
        assert_eq!(active_count(&db).await.unwrap(), 1);

        release(&db, "r1").await.unwrap();
        assert_eq!(active_count(&db).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn scan_active_returns_jobs_with_claim_times() {
        let (db, _dir) = setup_db().await;
        seed(&db, "a1", CallPriority::Normal).await;
        enqueue(&db, "a1", CallPriority::Normal).await.unwrap();
        pop_ready(&db, 1).await.unwrap();

        let active = scan_active(&db).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].job.id, "a1");
        assert!(active[0].claimed_at <= Utc::now());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_covers_queued_and_scheduled_but_not_active() {
        let (db, _dir) = setup_db().await;
        seed(&db, "cq", CallPriority::Normal).await;
        enqueue(&db, "cq", CallPriority::Normal).await.unwrap();
        assert!(cancel_queued(&db, "cq").await.unwrap());
        let job = jobs::get(&db, "cq").await.unwrap().unwrap();
        assert_eq!(job.status, CallStatus::Cancelled);
        assert!(pop_ready(&db, 1).await.unwrap().is_empty());

        seed(&db, "cs", CallPriority::Normal).await;
        schedule(&db, "cs", Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(cancel_queued(&db, "cs").await.unwrap());

        seed(&db, "ca", CallPriority::Normal).await;
        enqueue(&db, "ca", CallPriority::Normal).await.unwrap();
        pop_ready(&db, 1).await.unwrap();
        assert!(!cancel_queued(&db, "ca").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn orphans_are_requeued_on_recovery() {
        let (db, _dir) = setup_db().await;
        seed(&db, "o1", CallPriority::High).await;
        enqueue(&db, "o1", CallPriority::High).await.unwrap();
        pop_ready(&db, 1).await.unwrap();

        // Terminal job stuck in the active set (crash between update and
        // release): recovery only releases it.
        seed(&db, "o2", CallPriority::Normal).await;
        enqueue(&db, "o2", CallPriority::Normal).await.unwrap();
        pop_ready(&db, 1).await.unwrap();
        jobs::update(&db, "o2", JobPatch::status(CallStatus::Completed))
            .await
            .unwrap();

        let requeued = requeue_orphans(&db).await.unwrap();
        assert_eq!(requeued, vec!["o1"]);
        assert_eq!(active_count(&db).await.unwrap(), 0);

        let job = jobs::get(&db, "o1").await.unwrap().unwrap();
        assert_eq!(job.status, CallStatus::Pending);
        assert_eq!(pop_ready(&db, 2).await.unwrap(), vec!["o1"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn queue_counts_break_out_by_priority() {
        let (db, _dir) = setup_db().await;
        for (id, priority) in [
            ("n1", CallPriority::Normal),
            ("n2", CallPriority::Normal),
            ("u1", CallPriority::Urgent),
        ] {
            seed(&db, id, priority).await;
            enqueue(&db, id, priority).await.unwrap();
        }
        seed(&db, "s1", CallPriority::Low).await;
        schedule(&db, "s1", Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();

        let counts = queue_counts(&db).await.unwrap();
        assert_eq!(counts.pending.normal, 2);
        assert_eq!(counts.pending.urgent, 1);
        assert_eq!(counts.pending.total(), 3);
        assert_eq!(counts.scheduled, 1);
        assert_eq!(counts.active, 0);
        db.close().await.unwrap();
    }
}
