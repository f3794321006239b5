// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the ingress REST API.
//!
//! Handles call enqueue (single and bulk), status queries, queued-call
//! cancellation, campaign listing, and queue metrics. Contract
//! violations (missing id, malformed specs) are rejected here and never
//! mutate state.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use outdial_core::{CallJob, CallPriority, CallStatus, OutdialError, PutOutcome};

use crate::server::GatewayState;

/// One call spec as submitted by the campaign backend.
#[derive(Debug, Clone, Deserialize)]
pub struct CallRequest {
    /// The backend's call identifier; doubles as the job id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub campaign_id: String,
    /// Opaque configuration; must carry `answer_url`.
    #[serde(default)]
    pub call_config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Response body for enqueue operations.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub call_id: String,
    pub status: CallStatus,
}

/// Request body for POST /v1/calls/bulk.
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    pub calls: Vec<CallRequest>,
}

/// Per-item outcome in a bulk response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BulkItem {
    Queued { call_id: String, status: CallStatus },
    Rejected { error: String },
}

/// Response body for POST /v1/calls/bulk.
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub batch_id: String,
    pub total: usize,
    pub queued: usize,
    pub rejected: usize,
    pub results: Vec<BulkItem>,
}

/// Query parameters for the campaign listing.
#[derive(Debug, Deserialize)]
pub struct CampaignQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error(e: OutdialError) -> Response {
    warn!(error = %e, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Checks the contract of one call spec; returns the validated job.
fn job_from_request(request: &CallRequest) -> Result<CallJob, String> {
    let id = match request.id.as_deref() {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => return Err("id is required".into()),
    };
    if request.phone_number.trim().is_empty() {
        return Err(format!("call {id}: phone_number is required"));
    }
    if request.campaign_id.trim().is_empty() {
        return Err(format!("call {id}: campaign_id is required"));
    }
    match request.call_config.get("answer_url").and_then(|v| v.as_str()) {
        Some(url) if !url.trim().is_empty() => {}
        _ => return Err(format!("call {id}: call_config.answer_url is required")),
    }
    let priority = match request.priority.as_deref() {
        None | Some("") => CallPriority::Normal,
        Some(p) => p.parse::<CallPriority>().map_err(|e| format!("call {id}: {e}"))?,
    };

    let mut job = CallJob::new(id, request.phone_number.trim(), request.campaign_id.trim());
    job.call_config = request.call_config.clone();
    job.priority = priority;
    job.scheduled_at = request.scheduled_at;
    if let Some(max_retries) = request.max_retries {
        job.max_retries = max_retries;
    }
    Ok(job)
}

/// Stores the job and routes it to the right index. Idempotent: an id
/// that already exists reports its current status and changes nothing.
async fn submit_job(state: &GatewayState, job: &CallJob) -> Result<EnqueueResponse, OutdialError> {
    match state.store.put(job).await? {
        PutOutcome::Created => {
            match job.scheduled_at {
                Some(at) if at > chrono::Utc::now() => {
                    state.store.schedule(&job.id, at).await?;
                    info!(call_id = %job.id, fire_at = %at, "call scheduled");
                    Ok(EnqueueResponse {
                        call_id: job.id.clone(),
                        status: CallStatus::Scheduled,
                    })
                }
                _ => {
                    state.store.enqueue(&job.id, job.priority).await?;
                    info!(call_id = %job.id, priority = %job.priority, "call queued");
                    Ok(EnqueueResponse {
                        call_id: job.id.clone(),
                        status: CallStatus::Pending,
                    })
                }
            }
        }
        PutOutcome::Exists => {
            let existing = state.store.get(&job.id).await?.ok_or_else(|| {
                OutdialError::Internal(format!("job {} vanished during enqueue", job.id))
            })?;
            info!(call_id = %job.id, status = %existing.status, "duplicate submission ignored");
            Ok(EnqueueResponse {
                call_id: existing.id,
                status: existing.status,
            })
        }
    }
}

/// POST /v1/calls
pub async fn enqueue_one(
    State(state): State<GatewayState>,
    Json(request): Json<CallRequest>,
) -> Response {
    let job = match job_from_request(&request) {
        Ok(job) => job,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    match submit_job(&state, &job).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /v1/calls/bulk
///
/// Each spec is processed independently; partial success is a valid
/// outcome and reported per item.
pub async fn enqueue_bulk(
    State(state): State<GatewayState>,
    Json(request): Json<BulkRequest>,
) -> Response {
    let batch_id = request
        .batch_id
        .clone()
        .unwrap_or_else(|| format!("batch-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S")));

    let mut results = Vec::with_capacity(request.calls.len());
    let mut queued = 0;
    for item in &request.calls {
        let mut item = item.clone();
        item.call_config
            .insert("batch_id".into(), serde_json::json!(batch_id));
        match job_from_request(&item) {
            Ok(job) => match submit_job(&state, &job).await {
                Ok(response) => {
                    queued += 1;
                    results.push(BulkItem::Queued {
                        call_id: response.call_id,
                        status: response.status,
                    });
                }
                Err(e) => results.push(BulkItem::Rejected {
                    error: e.to_string(),
                }),
            },
            Err(message) => results.push(BulkItem::Rejected { error: message }),
        }
    }

    let total = results.len();
    info!(batch_id = %batch_id, total, queued, "bulk enqueue processed");
    (
        StatusCode::OK,
        Json(BulkResponse {
            batch_id,
            total,
            queued,
            rejected: total - queued,
            results,
        }),
    )
        .into_response()
}

/// GET /v1/calls/{id}
pub async fn get_status(
    State(state): State<GatewayState>,
    Path(call_id): Path<String>,
) -> Response {
    match state.store.get(&call_id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("call {call_id} not found")),
        Err(e) => internal_error(e),
    }
}

/// DELETE /v1/calls/{id}
///
/// Cancels a call that is still queued or scheduled. Calls already owned
/// by a supervisor (or already terminal) are not cancellable.
pub async fn cancel_call(
    State(state): State<GatewayState>,
    Path(call_id): Path<String>,
) -> Response {
    match state.store.cancel_queued(&call_id).await {
        Ok(true) => {
            info!(call_id = %call_id, "call cancelled");
            (
                StatusCode::OK,
                Json(EnqueueResponse {
                    call_id,
                    status: CallStatus::Cancelled,
                }),
            )
                .into_response()
        }
        Ok(false) => error_response(
            StatusCode::CONFLICT,
            format!("call {call_id} is not queued (unknown, active, or already finished)"),
        ),
        Err(e) => internal_error(e),
    }
}

/// GET /v1/campaigns/{id}/calls
pub async fn campaign_calls(
    State(state): State<GatewayState>,
    Path(campaign_id): Path<String>,
    Query(query): Query<CampaignQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => match s.parse::<CallStatus>() {
            Ok(status) => Some(status),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
    };
    match state.store.list_campaign(&campaign_id, status).await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "campaign_id": campaign_id,
                "total": jobs.len(),
                "calls": jobs,
            })),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /v1/queue/metrics
pub async fn queue_metrics(State(state): State<GatewayState>) -> Response {
    match state.store.queue_counts().await {
        Ok(counts) => (StatusCode::OK, Json(state.metrics.snapshot(counts))).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /health
pub async fn health(State(state): State<GatewayState>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": state.start_time.elapsed().as_secs(),
        })),
    )
        .into_response()
}
