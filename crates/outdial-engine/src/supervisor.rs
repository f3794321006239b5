// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-call supervision state machine.
//!
//! One [`CallSupervisor::run`] per claimed job: register the call with the
//! voice agent, place it through the telephony provider (with jittered
//! exponential retries on transient failures), observe provider status
//! after a settling delay, reconcile the terminal outcome against one
//! final agent snapshot, deliver the result to the backend, and release
//! ownership. Every path out of `run` ends in a terminal job state, a
//! re-enqueue, or a persisted `reported_ok=false` result; results are
//! never dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use outdial_config::model::{SupervisorConfig, SweeperConfig};
use outdial_core::types::{CAUSE_AGENT_UNREACHABLE, CAUSE_NO_ANSWER_TIMEOUT};
use outdial_core::{
    AgentClient, AgentRegistration, AgentStatus, AttemptClose, CallAttempt, CallJob, CallOutcome,
    CallResult, CallStatus, DataSource, InitiateRequest, InitiatedCall, JobPatch, OutdialError,
    ProviderPhase, ResultSink, StateStore, TelephonyClient,
};

use crate::metrics::EngineMetrics;
use crate::retry::backoff_delay;

/// Supervision timings, resolved from config once at startup.
#[derive(Debug, Clone)]
pub struct SupervisorTimings {
    pub initial_status_delay: Duration,
    pub status_check_interval: Duration,
    pub max_status_retries: u32,
    pub stuck_call_deadline: Duration,
    pub min_connected_seconds: i64,
    pub max_poll_failures: u32,
    pub delivery_max_attempts: u32,
    /// Absolute bound on one supervision, shared with the sweeper.
    pub overall_deadline: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl SupervisorTimings {
    pub fn from_config(supervisor: &SupervisorConfig, sweeper: &SweeperConfig) -> Self {
        Self {
            initial_status_delay: Duration::from_secs(supervisor.initial_status_delay_seconds),
            status_check_interval: Duration::from_secs(supervisor.status_check_interval_seconds),
            max_status_retries: supervisor.max_status_retries,
            stuck_call_deadline: Duration::from_secs(supervisor.stuck_call_deadline_seconds),
            min_connected_seconds: supervisor.min_connected_seconds,
            max_poll_failures: supervisor.max_poll_failures,
            delivery_max_attempts: supervisor.delivery_max_attempts,
            overall_deadline: Duration::from_secs(sweeper.hard_deadline_seconds),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// How one attempt concluded, before delivery.
struct TerminalDecision {
    result: CallResult,
    /// Whether a Failed outcome may consume a job-level retry. Permanent
    /// provider rejections are not eligible.
    retryable: bool,
}

/// What `finish` did with the job.
///
/// After a requeue the job is poppable by another worker at once, so the
/// original owner must not touch the active set again: its id-keyed
/// release would delete the new owner's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinishDisposition {
    /// Terminal state recorded; the caller still owns the release.
    Finalized,
    /// Re-enqueued for another attempt; ownership was already released.
    Requeued,
}

/// Supervises one active call from initiation to release.
#[derive(Clone)]
pub struct CallSupervisor {
    store: Arc<dyn StateStore>,
    telephony: Arc<dyn TelephonyClient>,
    agent: Arc<dyn AgentClient>,
    sink: Arc<dyn ResultSink>,
    metrics: Arc<EngineMetrics>,
    timings: SupervisorTimings,
}

impl CallSupervisor {
    pub fn new(
        store: Arc<dyn StateStore>,
        telephony: Arc<dyn TelephonyClient>,
        agent: Arc<dyn AgentClient>,
        sink: Arc<dyn ResultSink>,
        metrics: Arc<EngineMetrics>,
        timings: SupervisorTimings,
    ) -> Self {
        Self {
            store,
            telephony,
            agent,
            sink,
            metrics,
            timings,
        }
    }

    /// Same dependencies, different timings. Test hook for shortened runs.
    pub fn clone_with_timings(&self, timings: SupervisorTimings) -> Self {
        Self {
            timings,
            ..self.clone()
        }
    }

    /// Drives the job to a terminal state or a re-enqueue, then releases
    /// ownership. Errors are contained here; the worker loop only awaits.
    pub async fn run(&self, job: CallJob) {
        let call_id = job.id.clone();
        info!(call_id = %call_id, phone = %job.phone_number, "supervising call");

        let disposition = match self.supervise(&job).await {
            Ok(disposition) => disposition,
            Err(OutdialError::TerminalState { status, .. }) => {
                // Someone else (the sweeper) finished this job first.
                debug!(call_id = %call_id, %status, "job already terminal, standing down");
                FinishDisposition::Finalized
            }
            Err(e) => {
                // Invariant breach or storage failure: contain it to this
                // job and move on.
                error!(call_id = %call_id, error = %e, "supervision aborted");
                let synthetic = self.synthetic_result(
                    &job,
                    CallStatus::Failed,
                    CallOutcome::Failed,
                    Some(outdial_core::types::CAUSE_INTERNAL_ERROR.to_string()),
                    None,
                );
                match self
                    .finish(
                        &job,
                        TerminalDecision {
                            result: synthetic,
                            retryable: false,
                        },
                    )
                    .await
                {
                    Ok(disposition) => disposition,
                    Err(e) => {
                        error!(call_id = %call_id, error = %e, "failed to record aborted supervision");
                        FinishDisposition::Finalized
                    }
                }
            }
        };

        // A requeued job belongs to whichever worker pops it next; only a
        // finalized one is still ours to release.
        if disposition == FinishDisposition::Finalized {
            if let Err(e) = self.store.release(&call_id).await {
                error!(call_id = %call_id, error = %e, "failed to release call");
            }
        }
    }

    async fn supervise(&self, job: &CallJob) -> Result<FinishDisposition, OutdialError> {
        // Best-effort agent registration; the call proceeds without it.
        let registration = AgentRegistration {
            call_id: job.id.clone(),
            phone_number: job.phone_number.clone(),
            campaign_id: job.campaign_id.clone(),
            provider_uuid: None,
            config: job.call_config.clone(),
        };
        if let Err(e) = self.agent.register(&registration).await {
            warn!(call_id = %job.id, error = %e, "agent registration failed, continuing");
        }

        let initiated = match self.initiate_with_retries(job).await? {
            Ok(initiated) => initiated,
            Err(decision) => return self.finish(job, decision).await,
        };

        info!(
            call_id = %job.id,
            provider_uuid = %initiated.provider_uuid,
            "call initiated"
        );

        let decision = self.observe(job, &initiated).await?;
        self.finish(job, decision).await
    }

    /// Places the call, retrying transient failures with backoff and
    /// recording every attempt in the job's attempt log.
    ///
    /// The outer error is a storage failure; the inner `Err` is a terminal
    /// decision for initiation that never succeeded.
    async fn initiate_with_retries(
        &self,
        job: &CallJob,
    ) -> Result<Result<InitiatedCall, TerminalDecision>, OutdialError> {
        let mut extras = serde_json::Map::new();
        extras.insert("campaign_id".into(), serde_json::json!(job.campaign_id));
        // Per-job answer URL from the ingress contract, when present.
        if let Some(answer_url) = job.call_config.get("answer_url") {
            extras.insert("answer_url".into(), answer_url.clone());
        }
        let request = InitiateRequest {
            call_id: job.id.clone(),
            phone_number: job.phone_number.clone(),
            extras,
        };

        let mut last_error: Option<OutdialError> = None;
        for attempt in 0..=self.timings.max_status_retries {
            if attempt > 0 {
                let delay =
                    backoff_delay(attempt, self.timings.backoff_base, self.timings.backoff_cap);
                debug!(call_id = %job.id, attempt, ?delay, "retrying initiation");
                tokio::time::sleep(delay).await;
            }

            let started_at = Utc::now();
            match self.telephony.initiate(&request).await {
                Ok(initiated) => {
                    self.store
                        .update(
                            &job.id,
                            JobPatch {
                                push_attempt: Some(CallAttempt {
                                    provider_uuid: Some(initiated.provider_uuid.clone()),
                                    started_at,
                                    terminal_status: None,
                                    hangup_cause: None,
                                }),
                                ..JobPatch::default()
                            },
                        )
                        .await?;
                    return Ok(Ok(initiated));
                }
                Err(e) => {
                    let transient = e.is_transient();
                    warn!(
                        call_id = %job.id,
                        attempt,
                        transient,
                        error = %e,
                        "initiation attempt failed"
                    );
                    self.store
                        .update(
                            &job.id,
                            JobPatch {
                                push_attempt: Some(CallAttempt {
                                    provider_uuid: None,
                                    started_at,
                                    terminal_status: Some(CallStatus::Failed),
                                    hangup_cause: Some(e.to_string()),
                                }),
                                ..JobPatch::default()
                            },
                        )
                        .await?;

                    if !transient {
                        let result = self.synthetic_result(
                            job,
                            CallStatus::Failed,
                            CallOutcome::Failed,
                            Some(e.to_string()),
                            None,
                        );
                        return Ok(Err(TerminalDecision {
                            result,
                            retryable: false,
                        }));
                    }
                    last_error = Some(e);
                }
            }
        }

        // Transient failures all the way down.
        if let Some(e) = last_error {
            debug!(call_id = %job.id, error = %e, "initiation retries exhausted");
        }
        let result = self.synthetic_result(
            job,
            CallStatus::Failed,
            CallOutcome::Failed,
            Some(CAUSE_AGENT_UNREACHABLE.to_string()),
            None,
        );
        Ok(Err(TerminalDecision {
            result,
            retryable: true,
        }))
    }

    /// Observation loop: poll the provider after a settling delay, track
    /// non-terminal transitions, and produce the terminal decision.
    async fn observe(
        &self,
        job: &CallJob,
        initiated: &InitiatedCall,
    ) -> Result<TerminalDecision, OutdialError> {
        let started = Instant::now();
        debug!(
            call_id = %job.id,
            delay = ?self.timings.initial_status_delay,
            "settling before first status poll"
        );
        tokio::time::sleep(self.timings.initial_status_delay).await;

        let mut consecutive_errors: u32 = 0;
        let mut last_status = CallStatus::Dispatching;
        let mut agent_snapshot: Option<AgentStatus> = None;

        loop {
            // Stuck in pre-answer states past the deadline: synthesize a miss.
            if matches!(last_status, CallStatus::Dispatching | CallStatus::Ringing)
                && started.elapsed() >= self.timings.stuck_call_deadline
            {
                warn!(
                    call_id = %job.id,
                    elapsed = ?started.elapsed(),
                    "call never progressed past {last_status}, synthesizing miss"
                );
                let agent = self.final_agent_snapshot(&job.id).await;
                let result = self.synthetic_result(
                    job,
                    CallStatus::Missed,
                    CallOutcome::Missed,
                    Some(CAUSE_NO_ANSWER_TIMEOUT.to_string()),
                    agent.as_ref(),
                );
                return Ok(TerminalDecision {
                    result,
                    retryable: false,
                });
            }

            // Absolute bound on one supervision. Same terminal status as
            // the other stuck paths; the Timeout outcome keeps the cause
            // distinguishable for the backend.
            if started.elapsed() >= self.timings.overall_deadline {
                warn!(call_id = %job.id, "supervision hit its hard deadline");
                let agent = self.final_agent_snapshot(&job.id).await;
                let result = self.synthetic_result(
                    job,
                    CallStatus::Missed,
                    CallOutcome::Timeout,
                    Some(CAUSE_NO_ANSWER_TIMEOUT.to_string()),
                    agent.as_ref(),
                );
                return Ok(TerminalDecision {
                    result,
                    retryable: false,
                });
            }

            match self.telephony.status(&initiated.provider_uuid).await {
                Ok(provider) => {
                    consecutive_errors = 0;
                    match provider.classify(self.timings.min_connected_seconds) {
                        ProviderPhase::Live(status) => {
                            if status != last_status {
                                info!(
                                    call_id = %job.id,
                                    from = %last_status,
                                    to = %status,
                                    "provider status changed"
                                );
                                self.store.update(&job.id, JobPatch::status(status)).await?;
                                last_status = status;
                            }
                            // Between provider polls, pick up transcript
                            // progress opportunistically. Never authoritative.
                            if let Ok(Some(snapshot)) = self.agent.status(&job.id).await {
                                agent_snapshot = Some(snapshot);
                            }
                        }
                        ProviderPhase::Terminal {
                            status,
                            outcome,
                            hangup_cause,
                        } => {
                            let agent = match self.final_agent_snapshot(&job.id).await {
                                Some(snapshot) => Some(snapshot),
                                None => agent_snapshot.take(),
                            };
                            return Ok(TerminalDecision {
                                result: self.reconciled_result(
                                    job,
                                    status,
                                    outcome,
                                    hangup_cause,
                                    &provider,
                                    agent.as_ref(),
                                ),
                                retryable: matches!(outcome, CallOutcome::Failed),
                            });
                        }
                        ProviderPhase::Unknown => {
                            debug!(
                                call_id = %job.id,
                                raw_state = %provider.raw_state,
                                "unrecognized provider state, keeping current status"
                            );
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        call_id = %job.id,
                        consecutive_errors,
                        error = %e,
                        "status poll failed"
                    );
                    if !e.is_transient() || consecutive_errors >= self.timings.max_poll_failures {
                        return Ok(self.provider_unreachable_decision(job).await);
                    }
                }
            }

            tokio::time::sleep(self.timings.status_check_interval).await;
        }
    }

    /// The provider cannot be reached: fall back to one final agent poll,
    /// trusting a terminal agent phase, else synthesize a failure.
    async fn provider_unreachable_decision(&self, job: &CallJob) -> TerminalDecision {
        warn!(call_id = %job.id, "provider unreachable, falling back to agent");
        if let Some(agent) = self.final_agent_snapshot(&job.id).await {
            if agent.is_terminal_phase() {
                let (status, outcome) = agent_terminal_mapping(&agent.phase);
                let duration = agent
                    .raw
                    .get("duration")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let result = CallResult {
                    call_id: job.id.clone(),
                    status,
                    call_outcome: outcome,
                    duration_seconds: duration,
                    hangup_cause: None,
                    transcript: agent.transcript.clone(),
                    recording_ref: agent.recording_ref.clone(),
                    provider_data: None,
                    agent_data: Some(agent.raw.clone()),
                    data_source: DataSource::AgentOnly,
                    reported_at: None,
                    reported_ok: false,
                };
                return TerminalDecision {
                    result,
                    retryable: false,
                };
            }
        }
        let result = self.synthetic_result(
            job,
            CallStatus::Failed,
            CallOutcome::Failed,
            Some(CAUSE_AGENT_UNREACHABLE.to_string()),
            None,
        );
        TerminalDecision {
            result,
            retryable: true,
        }
    }

    /// One final agent poll at reconciliation time. Failures downgrade to
    /// whatever was gathered during observation.
    async fn final_agent_snapshot(&self, call_id: &str) -> Option<AgentStatus> {
        match self.agent.status(call_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(call_id, error = %e, "final agent poll failed");
                None
            }
        }
    }

    /// Builds the provider-authoritative result: duration, cause, and
    /// status from the provider; transcript and recording from the agent.
    fn reconciled_result(
        &self,
        job: &CallJob,
        status: CallStatus,
        outcome: CallOutcome,
        hangup_cause: Option<String>,
        provider: &outdial_core::ProviderStatus,
        agent: Option<&AgentStatus>,
    ) -> CallResult {
        CallResult {
            call_id: job.id.clone(),
            status,
            call_outcome: outcome,
            duration_seconds: provider.duration_seconds,
            hangup_cause,
            transcript: agent.and_then(|a| a.transcript.clone()),
            recording_ref: agent.and_then(|a| a.recording_ref.clone()),
            provider_data: Some(provider.raw.clone()),
            agent_data: agent.map(|a| a.raw.clone()),
            data_source: DataSource::ProviderPrimary,
            reported_at: None,
            reported_ok: false,
        }
    }

    /// A result produced without provider confirmation.
    fn synthetic_result(
        &self,
        job: &CallJob,
        status: CallStatus,
        outcome: CallOutcome,
        hangup_cause: Option<String>,
        agent: Option<&AgentStatus>,
    ) -> CallResult {
        CallResult {
            call_id: job.id.clone(),
            status,
            call_outcome: outcome,
            duration_seconds: 0,
            hangup_cause,
            transcript: agent.and_then(|a| a.transcript.clone()),
            recording_ref: agent.and_then(|a| a.recording_ref.clone()),
            provider_data: None,
            agent_data: agent.map(|a| a.raw.clone()),
            data_source: DataSource::SupervisorSynthetic,
            reported_at: None,
            reported_ok: false,
        }
    }

    /// Terminal step: either consume a job-level retry (Failed outcomes
    /// only) or deliver the result and persist the terminal record.
    async fn finish(
        &self,
        job: &CallJob,
        decision: TerminalDecision,
    ) -> Result<FinishDisposition, OutdialError> {
        let TerminalDecision { mut result, retryable } = decision;

        let failed = result.call_outcome == CallOutcome::Failed;
        if failed && retryable && job.retry_count < job.max_retries {
            let next_retry = job.retry_count + 1;
            info!(
                call_id = %job.id,
                retry = next_retry,
                max_retries = job.max_retries,
                "re-enqueueing failed call"
            );
            self.store
                .update(
                    &job.id,
                    JobPatch {
                        status: Some(CallStatus::Pending),
                        retry_count: Some(next_retry),
                        close_attempt: Some(AttemptClose {
                            terminal_status: CallStatus::Failed,
                            hangup_cause: result.hangup_cause.clone(),
                        }),
                        ..JobPatch::default()
                    },
                )
                .await?;
            // Release ownership before the job becomes poppable again.
            self.store.release(&job.id).await?;
            self.store.enqueue(&job.id, job.priority).await?;
            return Ok(FinishDisposition::Requeued);
        }

        result.reported_at = Some(Utc::now());
        result.reported_ok = self.deliver_with_retries(&result).await;
        if !result.reported_ok {
            // Never drop the result: it stays on the record for an
            // operator to reconcile later.
            error!(call_id = %job.id, "result delivery exhausted retries");
        }

        self.store
            .update(
                &job.id,
                JobPatch {
                    status: Some(result.status),
                    result: Some(result.clone()),
                    close_attempt: Some(AttemptClose {
                        terminal_status: result.status,
                        hangup_cause: result.hangup_cause.clone(),
                    }),
                    ..JobPatch::default()
                },
            )
            .await?;

        self.metrics
            .record_outcome(result.call_outcome == CallOutcome::Completed);

        info!(
            call_id = %job.id,
            status = %result.status,
            outcome = %result.call_outcome,
            duration = result.duration_seconds,
            reported_ok = result.reported_ok,
            "call finished"
        );
        Ok(FinishDisposition::Finalized)
    }

    /// Posts the result to the backend, retrying transient failures with
    /// jittered exponential backoff. Returns whether delivery succeeded.
    async fn deliver_with_retries(&self, result: &CallResult) -> bool {
        let policy = ExponentialBuilder::default()
            .with_min_delay(self.timings.backoff_base)
            .with_max_delay(self.timings.backoff_cap)
            .with_max_times(self.timings.delivery_max_attempts.saturating_sub(1) as usize)
            .with_jitter();

        let call_id = result.call_id.clone();
        let outcome = (|| self.sink.deliver(result))
            .retry(policy)
            .when(|e: &OutdialError| e.is_transient())
            .notify(|err, dur| {
                warn!(
                    call_id = %call_id,
                    error = %err,
                    "result delivery failed, retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await;

        match outcome {
            Ok(()) => true,
            Err(e) => {
                error!(call_id = %result.call_id, error = %e, "result delivery failed");
                false
            }
        }
    }
}

/// Maps a terminal agent phase to the engine's model, for the rare
/// agent-only reconciliation path.
fn agent_terminal_mapping(phase: &str) -> (CallStatus, CallOutcome) {
    match phase.to_ascii_lowercase().as_str() {
        "completed" | "ended" | "hangup" => (CallStatus::Completed, CallOutcome::Completed),
        "failed" => (CallStatus::Failed, CallOutcome::Failed),
        "busy" => (CallStatus::Missed, CallOutcome::Busy),
        "rejected" => (CallStatus::Failed, CallOutcome::Rejected),
        _ => (CallStatus::Missed, CallOutcome::Missed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_phase_mapping_covers_terminal_set() {
        assert_eq!(
            agent_terminal_mapping("completed"),
            (CallStatus::Completed, CallOutcome::Completed)
        );
        assert_eq!(
            agent_terminal_mapping("failed"),
            (CallStatus::Failed, CallOutcome::Failed)
        );
        assert_eq!(
            agent_terminal_mapping("busy"),
            (CallStatus::Missed, CallOutcome::Busy)
        );
        assert_eq!(
            agent_terminal_mapping("missed"),
            (CallStatus::Missed, CallOutcome::Missed)
        );
    }

    #[test]
    fn timings_resolve_from_config() {
        let timings = SupervisorTimings::from_config(
            &SupervisorConfig::default(),
            &SweeperConfig::default(),
        );
        assert_eq!(timings.initial_status_delay, Duration::from_secs(20));
        assert_eq!(timings.status_check_interval, Duration::from_secs(15));
        assert_eq!(timings.stuck_call_deadline, Duration::from_secs(45));
        assert_eq!(timings.overall_deadline, Duration::from_secs(300));
        assert_eq!(timings.backoff_base, Duration::from_secs(1));
        assert_eq!(timings.backoff_cap, Duration::from_secs(30));
    }
}
