// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between `call_jobs` columns and the core [`CallJob`] type.
//!
//! Enum-valued columns are stored as their snake_case strings, JSON-valued
//! columns (`call_config`, `attempt_log`, `result`) as serialized text.

use outdial_core::{CallJob, CallPriority, CallStatus, OutdialError};

use crate::database::{fmt_ts, parse_ts};

/// Raw `call_jobs` row as read from SQLite.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub phone_number: String,
    pub campaign_id: String,
    pub call_config: String,
    pub priority: i64,
    pub scheduled_at: Option<String>,
    pub max_retries: i64,
    pub retry_count: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub attempt_log: String,
    pub result: Option<String>,
}

impl JobRow {
    /// Column list matching [`JobRow::from_sql_row`], for SELECT statements.
    pub const COLUMNS: &'static str = "id, phone_number, campaign_id, call_config, priority, \
         scheduled_at, max_retries, retry_count, status, created_at, updated_at, attempt_log, result";

    /// Builds a row from a query positioned on [`JobRow::COLUMNS`].
    pub fn from_sql_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            phone_number: row.get(1)?,
            campaign_id: row.get(2)?,
            call_config: row.get(3)?,
            priority: row.get(4)?,
            scheduled_at: row.get(5)?,
            max_retries: row.get(6)?,
            retry_count: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            attempt_log: row.get(11)?,
            result: row.get(12)?,
        })
    }

    /// Decodes the row into the core model.
    pub fn into_job(self) -> Result<CallJob, OutdialError> {
        let priority = CallPriority::from_rank(self.priority).ok_or_else(|| {
            OutdialError::Internal(format!(
                "job {} has corrupt priority rank {}",
                self.id, self.priority
            ))
        })?;
        let status: CallStatus = self.status.parse().map_err(OutdialError::Internal)?;
        let scheduled_at = match self.scheduled_at {
            Some(ref s) => Some(parse_ts(s)?),
            None => None,
        };
        let result = match self.result {
            Some(ref s) => Some(serde_json::from_str(s).map_err(|e| OutdialError::Storage {
                source: Box::new(e),
            })?),
            None => None,
        };
        Ok(CallJob {
            id: self.id,
            phone_number: self.phone_number,
            campaign_id: self.campaign_id,
            call_config: serde_json::from_str(&self.call_config).map_err(|e| {
                OutdialError::Storage {
                    source: Box::new(e),
                }
            })?,
            priority,
            scheduled_at,
            max_retries: self.max_retries as u32,
            retry_count: self.retry_count as u32,
            status,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            attempt_log: serde_json::from_str(&self.attempt_log).map_err(|e| {
                OutdialError::Storage {
                    source: Box::new(e),
                }
            })?,
            result,
        })
    }
}

/// Encodes the JSON-valued fields of a job for insertion.
pub struct EncodedJob {
    pub call_config: String,
    pub attempt_log: String,
    pub result: Option<String>,
    pub scheduled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl EncodedJob {
    pub fn from_job(job: &CallJob) -> Result<Self, OutdialError> {
        Ok(Self {
            call_config: serde_json::to_string(&job.call_config).map_err(json_err)?,
            attempt_log: serde_json::to_string(&job.attempt_log).map_err(json_err)?,
            result: match &job.result {
                Some(r) => Some(serde_json::to_string(r).map_err(json_err)?),
                None => None,
            },
            scheduled_at: job.scheduled_at.map(fmt_ts),
            created_at: fmt_ts(job.created_at),
            updated_at: fmt_ts(job.updated_at),
        })
    }
}

fn json_err(e: serde_json::Error) -> OutdialError {
    OutdialError::Storage {
        source: Box::new(e),
    }
}
