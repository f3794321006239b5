// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress HTTP server built on axum.
//!
//! Sets up routes, CORS, and shared state. Authentication is out of
//! scope for this surface; deploy it behind a trusted boundary.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use outdial_config::model::GatewayConfig;
use outdial_core::{OutdialError, StateStore};
use outdial_engine::EngineMetrics;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn StateStore>,
    pub metrics: Arc<EngineMetrics>,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(store: Arc<dyn StateStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            store,
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// Builds the ingress router. Exposed separately for handler tests.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/calls", post(handlers::enqueue_one))
        .route("/v1/calls/bulk", post(handlers::enqueue_bulk))
        .route("/v1/calls/{id}", get(handlers::get_status))
        .route("/v1/calls/{id}", delete(handlers::cancel_call))
        .route("/v1/campaigns/{id}/calls", get(handlers::campaign_calls))
        .route("/v1/queue/metrics", get(handlers::queue_metrics))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Binds and serves the ingress until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), OutdialError> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OutdialError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| OutdialError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
