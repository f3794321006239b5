// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness assembling a complete engine on a temp database.
//!
//! `EngineHarness` wires the SQLite store, the scripted mock adapters,
//! and a running dispatcher with millisecond-scale timings, so scenario
//! tests drive the real state machine end-to-end without wall-clock
//! waits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use outdial_config::model::{OutdialConfig, StorageConfig};
use outdial_core::{CallJob, CallStatus, OutdialError, StateStore};
use outdial_engine::{Dispatcher, SupervisorTimings};
use outdial_storage::SqliteStore;

use crate::mock_sink::MockSink;
use crate::mock_telephony::MockTelephony;
use crate::mock_voicebot::MockVoicebot;

/// Millisecond-scale supervision timings for tests.
pub fn fast_timings() -> SupervisorTimings {
    SupervisorTimings {
        initial_status_delay: Duration::from_millis(10),
        status_check_interval: Duration::from_millis(25),
        max_status_retries: 3,
        stuck_call_deadline: Duration::from_millis(200),
        min_connected_seconds: 5,
        max_poll_failures: 6,
        delivery_max_attempts: 5,
        overall_deadline: Duration::from_secs(5),
        backoff_base: Duration::from_millis(5),
        backoff_cap: Duration::from_millis(20),
    }
}

/// Builder for [`EngineHarness`].
pub struct EngineHarnessBuilder {
    workers: usize,
    rate_limit_per_second: u32,
    max_concurrent_calls: u64,
    timings: SupervisorTimings,
    sweeper_interval: Duration,
    hard_deadline: Duration,
    stuck_update_threshold: Duration,
}

impl EngineHarnessBuilder {
    fn new() -> Self {
        Self {
            workers: 2,
            rate_limit_per_second: 100,
            max_concurrent_calls: 100,
            timings: fast_timings(),
            sweeper_interval: Duration::from_secs(3600),
            hard_deadline: Duration::from_secs(3600),
            stuck_update_threshold: Duration::from_secs(3600),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit_per_second = per_second;
        self
    }

    pub fn max_concurrent(mut self, ceiling: u64) -> Self {
        self.max_concurrent_calls = ceiling;
        self
    }

    pub fn timings(mut self, timings: SupervisorTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Enables the sweeper with the given cadence and thresholds
    /// (disabled by default through hour-long settings).
    pub fn sweeper(
        mut self,
        interval: Duration,
        hard_deadline: Duration,
        stuck_update_threshold: Duration,
    ) -> Self {
        self.sweeper_interval = interval;
        self.hard_deadline = hard_deadline;
        self.stuck_update_threshold = stuck_update_threshold;
        self
    }

    pub async fn build(self) -> Result<EngineHarness, OutdialError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| OutdialError::Storage {
            source: Box::new(e),
        })?;
        let storage_config = StorageConfig {
            database_path: temp_dir
                .path()
                .join("engine.db")
                .to_string_lossy()
                .into_owned(),
            ..StorageConfig::default()
        };
        let store: Arc<dyn StateStore> = Arc::new(SqliteStore::open(&storage_config).await?);

        let telephony = Arc::new(MockTelephony::new());
        let voicebot = Arc::new(MockVoicebot::new());
        let sink = Arc::new(MockSink::new());

        let mut config = OutdialConfig::default();
        config.queue.workers = self.workers;
        config.queue.rate_limit_per_second = self.rate_limit_per_second;
        config.queue.max_concurrent_calls = self.max_concurrent_calls;
        config.queue.idle_poll_ms = 10;
        config.sweeper.interval_seconds = self.sweeper_interval.as_secs().max(1);
        config.sweeper.hard_deadline_seconds = self.hard_deadline.as_secs();
        config.sweeper.stuck_update_threshold_seconds = self.stuck_update_threshold.as_secs();

        let dispatcher = Dispatcher::new(
            &config,
            store.clone(),
            telephony.clone(),
            voicebot.clone(),
            sink.clone(),
        )
        .with_timings(self.timings);

        let cancel = CancellationToken::new();
        let runner = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(cancel).await })
        };

        Ok(EngineHarness {
            store,
            telephony,
            voicebot,
            sink,
            dispatcher,
            cancel,
            runner: Some(runner),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine over mock collaborators and a temp database.
pub struct EngineHarness {
    pub store: Arc<dyn StateStore>,
    pub telephony: Arc<MockTelephony>,
    pub voicebot: Arc<MockVoicebot>,
    pub sink: Arc<MockSink>,
    pub dispatcher: Dispatcher,
    cancel: CancellationToken,
    runner: Option<tokio::task::JoinHandle<()>>,
    _temp_dir: tempfile::TempDir,
}

impl EngineHarness {
    pub fn builder() -> EngineHarnessBuilder {
        EngineHarnessBuilder::new()
    }

    /// Stores the job and makes it dispatchable: scheduled jobs go to the
    /// scheduled index, everything else straight to its priority queue.
    pub async fn submit(&self, job: &CallJob) -> Result<(), OutdialError> {
        self.store.put(job).await?;
        match job.scheduled_at {
            Some(at) => self.store.schedule(&job.id, at).await,
            None => self.store.enqueue(&job.id, job.priority).await,
        }
    }

    /// Polls the store until the job reaches a terminal state.
    pub async fn wait_for_terminal(
        &self,
        call_id: &str,
        timeout: Duration,
    ) -> Result<CallJob, OutdialError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.store.get(call_id).await? {
                if job.status.is_terminal() {
                    return Ok(job);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OutdialError::Internal(format!(
                    "call {call_id} did not reach a terminal state within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls the store until the job reaches `status`.
    pub async fn wait_for_status(
        &self,
        call_id: &str,
        status: CallStatus,
        timeout: Duration,
    ) -> Result<CallJob, OutdialError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.store.get(call_id).await? {
                if job.status == status {
                    return Ok(job);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(OutdialError::Internal(format!(
                    "call {call_id} did not reach {status} within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops the dispatcher and waits for its tasks to drain.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(runner) = self.runner.take() {
            let _ = runner.await;
        }
    }
}

/// A minimal pending job for tests.
pub fn test_job(id: &str) -> CallJob {
    let mut job = CallJob::new(id, "+15550001", "campaign-test");
    job.call_config
        .insert("flow_name".into(), serde_json::json!("test-flow"));
    job
}
