// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `outdial serve` command implementation.
//!
//! Wires the SQLite state store, the Plivo and voice-agent clients, the
//! backend sink, the dispatcher, and the ingress gateway; recovers
//! orphaned calls from a previous process; and runs until SIGTERM/SIGINT.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use outdial_backend::BackendSink;
use outdial_config::OutdialConfig;
use outdial_core::{OutdialError, StateStore};
use outdial_engine::Dispatcher;
use outdial_gateway::GatewayState;
use outdial_plivo::PlivoClient;
use outdial_storage::SqliteStore;
use outdial_voicebot::VoicebotClient;

/// Runs the `outdial serve` command.
pub async fn run_serve(config: OutdialConfig) -> Result<(), OutdialError> {
    init_tracing(&config.engine.log_level);

    info!("starting outdial serve");

    // State store first: everything else hangs off it.
    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::open(&config.storage).await?);

    // Crash recovery: calls claimed by a dead process go back to Pending.
    let orphans = store.requeue_orphans().await?;
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "requeued calls orphaned by a previous process");
    }

    let telephony = Arc::new(PlivoClient::new(&config.plivo, &config.http)?);
    let voicebot = Arc::new(VoicebotClient::new(&config.voicebot, &config.http)?);
    let sink = Arc::new(BackendSink::new(&config.backend, &config.http)?);

    let dispatcher = Dispatcher::new(
        &config,
        store.clone(),
        telephony,
        voicebot,
        sink,
    );

    // Install signal handler.
    let cancel = install_signal_handler();

    // Ingress gateway (if enabled).
    if config.gateway.enabled {
        let state = GatewayState::new(store.clone(), dispatcher.metrics());
        let gateway_config = config.gateway.clone();
        let gateway_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) =
                outdial_gateway::start_server(&gateway_config, state, gateway_cancel).await
            {
                error!(error = %e, "gateway terminated");
            }
        });
    } else {
        info!("gateway disabled by configuration");
    }

    // The dispatcher runs until the cancel token fires, then drains its
    // workers (in-flight supervisions finish on their own deadlines).
    dispatcher.run(cancel).await;

    store.close().await?;
    info!("outdial serve shutdown complete");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("outdial={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
