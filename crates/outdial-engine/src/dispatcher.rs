// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher: worker pool, scheduled-call promoter, stuck-call
//! sweeper, and terminal-job janitor.
//!
//! Workers loop acquire-token -> pop-one -> supervise-to-release. The pool
//! never pops while the active set is at `max_concurrent_calls`, so that
//! ceiling holds regardless of the worker count. On shutdown workers stop
//! popping and in-flight supervisions run to their own deadlines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use outdial_config::model::OutdialConfig;
use outdial_core::types::CAUSE_NO_ANSWER_TIMEOUT;
use outdial_core::{
    ActiveEntry, AgentClient, CallOutcome, CallResult, CallStatus, DataSource, JobPatch,
    OutdialError, ResultSink, StateStore, TelephonyClient,
};

use crate::limiter::RateLimiter;
use crate::metrics::EngineMetrics;
use crate::supervisor::{CallSupervisor, SupervisorTimings};

/// Promoter cadence; scheduled jobs fire within one tick of their time.
const PROMOTER_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the dispatcher needs to run, bundled for cloning into tasks.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn StateStore>,
    supervisor: CallSupervisor,
    limiter: Arc<RateLimiter>,
    metrics: Arc<EngineMetrics>,
    sink: Arc<dyn ResultSink>,
    /// Serializes the capacity check with the pop, so concurrent workers
    /// cannot overshoot `max_concurrent_calls` between the two.
    dispatch_gate: Arc<tokio::sync::Mutex<()>>,
    workers: usize,
    max_concurrent_calls: u64,
    idle_poll: Duration,
    sweep_interval: Duration,
    hard_deadline: Duration,
    stuck_update_threshold: Duration,
    janitor_interval: Duration,
    retention: Duration,
}

impl Dispatcher {
    pub fn new(
        config: &OutdialConfig,
        store: Arc<dyn StateStore>,
        telephony: Arc<dyn TelephonyClient>,
        agent: Arc<dyn AgentClient>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::default());
        let timings = SupervisorTimings::from_config(&config.supervisor, &config.sweeper);
        let supervisor = CallSupervisor::new(
            store.clone(),
            telephony,
            agent,
            sink.clone(),
            metrics.clone(),
            timings,
        );
        Self {
            store,
            supervisor,
            limiter: Arc::new(RateLimiter::per_second(config.queue.rate_limit_per_second)),
            metrics,
            sink,
            dispatch_gate: Arc::new(tokio::sync::Mutex::new(())),
            workers: config.queue.workers,
            max_concurrent_calls: config.queue.max_concurrent_calls,
            idle_poll: Duration::from_millis(config.queue.idle_poll_ms),
            sweep_interval: Duration::from_secs(config.sweeper.interval_seconds),
            hard_deadline: Duration::from_secs(config.sweeper.hard_deadline_seconds),
            stuck_update_threshold: Duration::from_secs(
                config.sweeper.stuck_update_threshold_seconds,
            ),
            janitor_interval: Duration::from_secs(config.storage.janitor_interval_seconds),
            retention: Duration::from_secs(config.storage.retention_hours * 3600),
        }
    }

    /// Test hook: replace the resolved supervisor timings.
    pub fn with_timings(mut self, timings: SupervisorTimings) -> Self {
        self.supervisor = self.supervisor.clone_with_timings(timings);
        self
    }

    /// Shared throughput metrics, for the gateway.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Runs workers, promoter, sweeper, and janitor until `cancel` fires,
    /// then drains the workers.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            workers = self.workers,
            max_concurrent = self.max_concurrent_calls,
            "dispatcher starting"
        );

        let mut tasks = JoinSet::new();
        for worker_id in 0..self.workers {
            let dispatcher = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { dispatcher.worker_loop(worker_id, cancel).await });
        }
        {
            let dispatcher = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { dispatcher.promoter_loop(cancel).await });
        }
        {
            let dispatcher = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { dispatcher.sweeper_loop(cancel).await });
        }
        {
            let dispatcher = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { dispatcher.janitor_loop(cancel).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "dispatcher task panicked");
            }
        }
        info!("dispatcher stopped");
    }

    /// One worker: token, pop, supervise, repeat.
    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) {
        debug!(worker_id, "worker started");
        while !cancel.is_cancelled() {
            if self.limiter.acquire(&cancel).await.is_err() {
                break; // shutdown
            }

            // Ceiling check and pop under the gate: the check is only
            // meaningful if nobody pops between it and ours.
            let popped = {
                let _gate = self.dispatch_gate.lock().await;
                match self.store.active_count().await {
                    Ok(active) if active >= self.max_concurrent_calls => None,
                    Ok(_) => match self.store.pop_ready(1).await {
                        Ok(ids) => Some(ids),
                        Err(e) => {
                            error!(worker_id, error = %e, "pop failed");
                            None
                        }
                    },
                    Err(e) => {
                        error!(worker_id, error = %e, "active-count query failed");
                        None
                    }
                }
            };
            let Some(call_id) = popped.and_then(|ids| ids.into_iter().next()) else {
                self.idle_wait(&cancel).await;
                continue;
            };

            let job = match self.store.get(&call_id).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    warn!(worker_id, call_id = %call_id, "popped id has no record");
                    if let Err(e) = self.store.release(&call_id).await {
                        error!(call_id = %call_id, error = %e, "failed to release orphan id");
                    }
                    continue;
                }
                Err(e) => {
                    error!(worker_id, call_id = %call_id, error = %e, "job load failed");
                    if let Err(e) = self.store.release(&call_id).await {
                        error!(call_id = %call_id, error = %e, "failed to release unloadable id");
                    }
                    continue;
                }
            };

            debug!(worker_id, call_id = %call_id, "worker claimed call");
            self.metrics.record_dispatch();
            // Await the supervisor's release before looping.
            self.supervisor.run(job).await;
        }
        debug!(worker_id, "worker stopped");
    }

    async fn idle_wait(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.idle_poll) => {}
            _ = cancel.cancelled() => {}
        }
    }

    /// Every second, move due scheduled calls into their priority queues.
    async fn promoter_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(PROMOTER_INTERVAL);
        interval.tick().await; // skip the immediate tick
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.promote_due(Utc::now()).await {
                        Ok(promoted) if !promoted.is_empty() => {
                            info!(count = promoted.len(), "promoted scheduled calls");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "promotion failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("promoter shutting down");
                    break;
                }
            }
        }
    }

    /// Second line of defense: force-complete calls whose supervisor has
    /// been alive past the hard deadline and gone quiet.
    async fn sweeper_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "sweep failed");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("sweeper shutting down");
                    break;
                }
            }
        }
    }

    async fn sweep_once(&self) -> Result<(), OutdialError> {
        let now = Utc::now();
        let active = self.store.scan_active().await?;
        for entry in active {
            if self.is_stuck(&entry, now) {
                let call_id = entry.job.id.clone();
                warn!(
                    call_id = %call_id,
                    claimed_at = %entry.claimed_at,
                    "force-completing stuck call"
                );
                if let Err(e) = self.force_complete(entry).await {
                    // A live supervisor may have finished concurrently;
                    // terminal conflicts are exactly that race.
                    match e {
                        OutdialError::TerminalState { .. } => {
                            debug!(call_id = %call_id, "call finished while sweeping");
                        }
                        other => error!(call_id = %call_id, error = %other, "force-complete failed"),
                    }
                }
            }
        }
        Ok(())
    }

    fn is_stuck(&self, entry: &ActiveEntry, now: chrono::DateTime<chrono::Utc>) -> bool {
        let alive = (now - entry.claimed_at).to_std().unwrap_or_default();
        let quiet = (now - entry.job.updated_at).to_std().unwrap_or_default();
        alive >= self.hard_deadline && quiet >= self.stuck_update_threshold
    }

    /// Synthesizes a Missed outcome for a job whose supervisor is gone.
    /// One delivery attempt; an undelivered result stays on the record.
    async fn force_complete(&self, entry: ActiveEntry) -> Result<(), OutdialError> {
        let mut result = CallResult {
            call_id: entry.job.id.clone(),
            status: CallStatus::Missed,
            call_outcome: CallOutcome::Missed,
            duration_seconds: 0,
            hangup_cause: Some(CAUSE_NO_ANSWER_TIMEOUT.to_string()),
            transcript: None,
            recording_ref: None,
            provider_data: None,
            agent_data: None,
            data_source: DataSource::SupervisorSynthetic,
            reported_at: Some(Utc::now()),
            reported_ok: false,
        };
        result.reported_ok = match self.sink.deliver(&result).await {
            Ok(()) => true,
            Err(e) => {
                warn!(call_id = %result.call_id, error = %e, "sweeper delivery failed");
                false
            }
        };

        self.store
            .update(
                &entry.job.id,
                JobPatch {
                    status: Some(CallStatus::Missed),
                    result: Some(result),
                    ..JobPatch::default()
                },
            )
            .await?;
        self.store.release(&entry.job.id).await?;
        self.metrics.record_outcome(false);
        Ok(())
    }

    /// Evicts terminal jobs older than the retention window.
    async fn janitor_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.janitor_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let cutoff = Utc::now()
                        - chrono::Duration::from_std(self.retention)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    match self.store.evict_terminal_before(cutoff).await {
                        Ok(0) => {}
                        Ok(evicted) => info!(evicted, "evicted expired terminal jobs"),
                        Err(e) => error!(error = %e, "eviction failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("janitor shutting down");
                    break;
                }
            }
        }
    }
}
