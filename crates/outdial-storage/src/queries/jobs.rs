// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job record operations: idempotent insert, reads, patched updates with
//! the monotonic-status guard, and terminal eviction.

use chrono::{DateTime, Utc};
use outdial_core::{CallJob, CallStatus, JobPatch, OutdialError, PutOutcome};
use rusqlite::params;

use crate::database::{fmt_ts, map_tr_err, Database};
use crate::models::{EncodedJob, JobRow};

/// Insert-or-ignore on the job id. A re-submission with an existing id
/// writes nothing and reports [`PutOutcome::Exists`].
pub async fn put(db: &Database, job: &CallJob) -> Result<PutOutcome, OutdialError> {
    let job = job.clone();
    let encoded = EncodedJob::from_job(&job)?;
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO call_jobs
                 (id, phone_number, campaign_id, call_config, priority, scheduled_at,
                  max_retries, retry_count, status, created_at, updated_at, attempt_log, result)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    job.id,
                    job.phone_number,
                    job.campaign_id,
                    encoded.call_config,
                    job.priority.rank(),
                    encoded.scheduled_at,
                    job.max_retries,
                    job.retry_count,
                    job.status.as_str(),
                    encoded.created_at,
                    encoded.updated_at,
                    encoded.attempt_log,
                    encoded.result,
                ],
            )?;
            Ok(if changed > 0 {
                PutOutcome::Created
            } else {
                PutOutcome::Exists
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<CallJob>, OutdialError> {
    let id = id.to_string();
    let row = db
        .connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM call_jobs WHERE id = ?1",
                JobRow::COLUMNS
            ))?;
            let mut rows = stmt.query(params![id])?;
            match rows.next()? {
                Some(row) => Ok(Some(JobRow::from_sql_row(row)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)?;
    row.map(JobRow::into_job).transpose()
}

/// Internal result of the update transaction, resolved to an error outside
/// the connection closure.
enum UpdateOutcome {
    Applied,
    NotFound,
    TerminalConflict(CallStatus),
    RetryOverflow { retry_count: u32, max_retries: u32 },
}

/// Merges `patch` into the record inside one transaction.
///
/// Rejects status writes on already-terminal jobs (the monotonic-status
/// invariant) and retry counts above the job's ceiling. Both rejections
/// leave the record untouched.
pub async fn update(db: &Database, id: &str, patch: JobPatch) -> Result<(), OutdialError> {
    let id_owned = id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let current = {
                let mut stmt = tx.prepare(
                    "SELECT status, attempt_log, retry_count, max_retries
                     FROM call_jobs WHERE id = ?1",
                )?;
                let mut rows = stmt.query(params![id_owned])?;
                match rows.next()? {
                    Some(row) => {
                        let status: String = row.get(0)?;
                        let attempt_log: String = row.get(1)?;
                        let retry_count: i64 = row.get(2)?;
                        let max_retries: i64 = row.get(3)?;
                        Some((status, attempt_log, retry_count, max_retries))
                    }
                    None => None,
                }
            };

            let (status_str, attempt_log_str, _retry_count, max_retries) = match current {
                Some(c) => c,
                None => {
                    tx.commit()?;
                    return Ok(UpdateOutcome::NotFound);
                }
            };

            let current_status: CallStatus = status_str
                .parse()
                .map_err(|e: String| tokio_rusqlite::Error::Other(e.into()))?;

            if current_status.is_terminal() {
                if let Some(new_status) = patch.status {
                    if new_status != current_status {
                        tx.commit()?;
                        return Ok(UpdateOutcome::TerminalConflict(current_status));
                    }
                }
            }

            if let Some(retry_count) = patch.retry_count {
                if i64::from(retry_count) > max_retries {
                    tx.commit()?;
                    return Ok(UpdateOutcome::RetryOverflow {
                        retry_count,
                        max_retries: max_retries as u32,
                    });
                }
            }

            let now = fmt_ts(Utc::now());

            if let Some(status) = patch.status {
                tx.execute(
                    "UPDATE call_jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), now, id_owned],
                )?;
            }
            if let Some(retry_count) = patch.retry_count {
                tx.execute(
                    "UPDATE call_jobs SET retry_count = ?1, updated_at = ?2 WHERE id = ?3",
                    params![retry_count, now, id_owned],
                )?;
            }
            if let Some(ref result) = patch.result {
                let encoded = serde_json::to_string(result)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                tx.execute(
                    "UPDATE call_jobs SET result = ?1, updated_at = ?2 WHERE id = ?3",
                    params![encoded, now, id_owned],
                )?;
            }
            if patch.push_attempt.is_some() || patch.close_attempt.is_some() {
                let mut attempts: Vec<outdial_core::CallAttempt> =
                    serde_json::from_str(&attempt_log_str)
                        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                if let Some(attempt) = patch.push_attempt {
                    attempts.push(attempt);
                }
                if let Some(close) = patch.close_attempt {
                    if let Some(last) = attempts.last_mut() {
                        last.terminal_status = Some(close.terminal_status);
                        last.hangup_cause = close.hangup_cause;
                    }
                }
                let encoded = serde_json::to_string(&attempts)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                tx.execute(
                    "UPDATE call_jobs SET attempt_log = ?1, updated_at = ?2 WHERE id = ?3",
                    params![encoded, now, id_owned],
                )?;
            }

            tx.commit()?;
            Ok(UpdateOutcome::Applied)
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        UpdateOutcome::Applied => Ok(()),
        UpdateOutcome::NotFound => Err(OutdialError::NotFound {
            call_id: id.to_string(),
        }),
        UpdateOutcome::TerminalConflict(status) => Err(OutdialError::TerminalState {
            call_id: id.to_string(),
            status,
        }),
        UpdateOutcome::RetryOverflow {
            retry_count,
            max_retries,
        } => Err(OutdialError::Internal(format!(
            "job {id}: retry_count {retry_count} would exceed max_retries {max_retries}"
        ))),
    }
}

pub async fn list_campaign(
    db: &Database,
    campaign_id: &str,
    status: Option<CallStatus>,
) -> Result<Vec<CallJob>, OutdialError> {
    let campaign_id = campaign_id.to_string();
    let rows = db
        .connection()
        .call(move |conn| {
            let mut out = Vec::new();
            match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM call_jobs
                         WHERE campaign_id = ?1 AND status = ?2 ORDER BY created_at ASC",
                        JobRow::COLUMNS
                    ))?;
                    let mut rows = stmt.query(params![campaign_id, status.as_str()])?;
                    while let Some(row) = rows.next()? {
                        out.push(JobRow::from_sql_row(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM call_jobs
                         WHERE campaign_id = ?1 ORDER BY created_at ASC",
                        JobRow::COLUMNS
                    ))?;
                    let mut rows = stmt.query(params![campaign_id])?;
                    while let Some(row) = rows.next()? {
                        out.push(JobRow::from_sql_row(row)?);
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Deletes terminal jobs whose last update is older than `cutoff`.
pub async fn evict_terminal_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<u64, OutdialError> {
    let cutoff = fmt_ts(cutoff);
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM call_jobs
                 WHERE status IN ('completed', 'failed', 'missed', 'cancelled')
                   AND updated_at < ?1",
                params![cutoff],
            )?;
            Ok(deleted as u64)
        })
        .await
        .map_err(map_tr_err)
}
