// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data model for the call engine.
//!
//! A [`CallJob`] is the engine's record of one outbound call from enqueue to
//! terminal outcome. The supervisor produces exactly one [`CallResult`] per
//! job at its terminal transition; the result carries provenance in
//! [`DataSource`] so operators can tell authoritative outcomes from
//! synthesized ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dispatch priority. Higher priorities drain strictly first; within a
/// priority, dispatch order is enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl CallPriority {
    /// Numeric rank used for queue ordering (higher dispatches first).
    pub fn rank(self) -> i64 {
        match self {
            CallPriority::Low => 1,
            CallPriority::Normal => 2,
            CallPriority::High => 3,
            CallPriority::Urgent => 4,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            1 => Some(CallPriority::Low),
            2 => Some(CallPriority::Normal),
            3 => Some(CallPriority::High),
            4 => Some(CallPriority::Urgent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallPriority::Low => "low",
            CallPriority::Normal => "normal",
            CallPriority::High => "high",
            CallPriority::Urgent => "urgent",
        }
    }
}

impl Default for CallPriority {
    fn default() -> Self {
        CallPriority::Normal
    }
}

impl std::fmt::Display for CallPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(CallPriority::Low),
            "normal" => Ok(CallPriority::Normal),
            "high" => Ok(CallPriority::High),
            "urgent" => Ok(CallPriority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Lifecycle state of a [`CallJob`].
///
/// Transitions are monotonic: once a job reaches a terminal state
/// (Completed, Failed, Missed, Cancelled) it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Waiting in a priority queue.
    Pending,
    /// Held in the scheduled index until its fire time.
    Scheduled,
    /// Owned by a supervisor; provider call not yet ringing.
    Dispatching,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Missed,
    Cancelled,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::Missed | CallStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Scheduled => "scheduled",
            CallStatus::Dispatching => "dispatching",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::Missed => "missed",
            CallStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CallStatus::Pending),
            "scheduled" => Ok(CallStatus::Scheduled),
            "dispatching" => Ok(CallStatus::Dispatching),
            "ringing" => Ok(CallStatus::Ringing),
            "in_progress" => Ok(CallStatus::InProgress),
            "completed" => Ok(CallStatus::Completed),
            "failed" => Ok(CallStatus::Failed),
            "missed" => Ok(CallStatus::Missed),
            "cancelled" => Ok(CallStatus::Cancelled),
            other => Err(format!("unknown call status: {other}")),
        }
    }
}

/// User-visible outcome of a finished call. Fixed set; provider hangup
/// causes are carried separately and verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Completed,
    Missed,
    Failed,
    Busy,
    NoAnswer,
    Rejected,
    Timeout,
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallOutcome::Completed => "completed",
            CallOutcome::Missed => "missed",
            CallOutcome::Failed => "failed",
            CallOutcome::Busy => "busy",
            CallOutcome::NoAnswer => "no_answer",
            CallOutcome::Rejected => "rejected",
            CallOutcome::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Provenance of a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Provider confirmed the terminal state; agent data merged in if present.
    ProviderPrimary,
    /// Provider unreachable; the agent's terminal phase was used instead.
    AgentOnly,
    /// Neither source confirmed; the supervisor or sweeper synthesized the outcome.
    SupervisorSynthetic,
}

/// Synthetic hangup cause for calls that never progressed past dispatch.
pub const CAUSE_NO_ANSWER_TIMEOUT: &str = "no_answer_timeout";
/// Synthetic hangup cause when the provider could not be reached at all.
pub const CAUSE_AGENT_UNREACHABLE: &str = "agent_unreachable";
/// Synthetic hangup cause for jobs failed by an internal invariant breach.
pub const CAUSE_INTERNAL_ERROR: &str = "internal_error";

/// One initiation attempt against the telephony provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAttempt {
    /// Provider-assigned UUID, absent when initiation itself failed.
    pub provider_uuid: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Terminal status of this attempt, filled when the attempt concludes.
    pub terminal_status: Option<CallStatus>,
    pub hangup_cause: Option<String>,
}

/// The consolidated outcome of one job, produced exactly once at its
/// terminal transition and delivered to the backend sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub call_id: String,
    pub status: CallStatus,
    pub call_outcome: CallOutcome,
    pub duration_seconds: i64,
    pub hangup_cause: Option<String>,
    /// Conversation transcript from the agent, opaque to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_ref: Option<String>,
    /// Raw provider status snapshot at reconciliation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<serde_json::Value>,
    /// Raw agent status snapshot at reconciliation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_data: Option<serde_json::Value>,
    pub data_source: DataSource,
    pub reported_at: Option<DateTime<Utc>>,
    pub reported_ok: bool,
}

/// The unit of work: one outbound call from enqueue to terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallJob {
    /// Backend-supplied identifier, unique for the system's lifetime.
    pub id: String,
    /// Destination in E.164 form.
    pub phone_number: String,
    pub campaign_id: String,
    /// Opaque configuration carried end-to-end (flow name, variables,
    /// recording flag, ...). The engine never interprets it.
    #[serde(default)]
    pub call_config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub priority: CallPriority,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub attempt_log: Vec<CallAttempt>,
    #[serde(default)]
    pub result: Option<CallResult>,
}

impl CallJob {
    /// Creates a fresh job in Pending state with empty history.
    pub fn new(
        id: impl Into<String>,
        phone_number: impl Into<String>,
        campaign_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            phone_number: phone_number.into(),
            campaign_id: campaign_id.into(),
            call_config: serde_json::Map::new(),
            priority: CallPriority::Normal,
            scheduled_at: None,
            max_retries: 3,
            retry_count: 0,
            status: CallStatus::Pending,
            created_at: now,
            updated_at: now,
            attempt_log: Vec::new(),
            result: None,
        }
    }
}

/// Closes the most recent entry of a job's attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptClose {
    pub terminal_status: CallStatus,
    pub hangup_cause: Option<String>,
}

/// A partial update merged into a job record by [`StateStore::update`].
///
/// Only the fields present are touched. Updates that would change the
/// status of an already-terminal job are rejected.
///
/// [`StateStore::update`]: crate::traits::StateStore::update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    pub status: Option<CallStatus>,
    pub retry_count: Option<u32>,
    pub result: Option<CallResult>,
    /// Appends a new entry to the attempt log.
    pub push_attempt: Option<CallAttempt>,
    /// Fills the terminal fields of the last attempt-log entry.
    pub close_attempt: Option<AttemptClose>,
}

impl JobPatch {
    pub fn status(status: CallStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// The telephony provider's view of a call, returned by status polls.
///
/// The provider is the ground truth for duration and hangup cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub raw_state: String,
    pub hangup_cause: Option<String>,
    pub duration_seconds: i64,
    pub answered: bool,
    pub ended_at: Option<String>,
    /// Full response body, preserved for `CallResult.provider_data`.
    pub raw: serde_json::Value,
}

/// Classification of a [`ProviderStatus`] into the engine's state model.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPhase {
    /// The call is still moving; carries the mapped non-terminal status.
    Live(CallStatus),
    /// The provider reports a terminal state.
    Terminal {
        status: CallStatus,
        outcome: CallOutcome,
        hangup_cause: Option<String>,
    },
    /// A raw state the mapping table does not know.
    Unknown,
}

impl ProviderStatus {
    /// Maps the provider's raw state to the internal model.
    ///
    /// `min_connected_secs` guards against the provider reporting
    /// "completed" for calls that rang but were never answered: a
    /// completed call shorter than the threshold is reclassified as a
    /// miss, refined by hangup cause where one is present.
    pub fn classify(&self, min_connected_secs: i64) -> ProviderPhase {
        let cause = self.hangup_cause.clone();
        let cause_lower = cause.as_deref().unwrap_or("").to_ascii_lowercase();
        match self.raw_state.to_ascii_lowercase().as_str() {
            "queued" | "initiated" => ProviderPhase::Live(CallStatus::Dispatching),
            "ringing" => ProviderPhase::Live(CallStatus::Ringing),
            "in-progress" | "answered" => ProviderPhase::Live(CallStatus::InProgress),
            "completed" => {
                if self.duration_seconds >= min_connected_secs {
                    ProviderPhase::Terminal {
                        status: CallStatus::Completed,
                        outcome: CallOutcome::Completed,
                        hangup_cause: cause,
                    }
                } else {
                    let outcome = if cause_lower.contains("busy") {
                        CallOutcome::Busy
                    } else if cause_lower.contains("reject") {
                        CallOutcome::Rejected
                    } else if cause_lower.contains("no_answer") || cause_lower.contains("no-answer")
                    {
                        CallOutcome::NoAnswer
                    } else {
                        CallOutcome::Missed
                    };
                    ProviderPhase::Terminal {
                        status: CallStatus::Completed,
                        outcome,
                        hangup_cause: cause,
                    }
                }
            }
            "busy" => ProviderPhase::Terminal {
                status: CallStatus::Missed,
                outcome: CallOutcome::Busy,
                hangup_cause: cause.or_else(|| Some("busy".into())),
            },
            "no-answer" | "no_answer" => ProviderPhase::Terminal {
                status: CallStatus::Missed,
                outcome: CallOutcome::NoAnswer,
                hangup_cause: cause.or_else(|| Some("no_answer".into())),
            },
            "failed" => ProviderPhase::Terminal {
                status: CallStatus::Failed,
                outcome: CallOutcome::Failed,
                hangup_cause: cause,
            },
            "rejected" => ProviderPhase::Terminal {
                status: CallStatus::Failed,
                outcome: CallOutcome::Rejected,
                hangup_cause: cause,
            },
            _ => ProviderPhase::Unknown,
        }
    }
}

/// The voice-agent service's view of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub phase: String,
    #[serde(default)]
    pub transcript: Option<serde_json::Value>,
    #[serde(default)]
    pub recording_ref: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Full response body, preserved for `CallResult.agent_data`.
    pub raw: serde_json::Value,
}

impl AgentStatus {
    /// True when the agent considers the conversation finished.
    pub fn is_terminal_phase(&self) -> bool {
        matches!(
            self.phase.to_ascii_lowercase().as_str(),
            "completed" | "ended" | "hangup" | "failed" | "missed" | "busy" | "rejected"
        )
    }
}

/// Pending-queue depths broken out by priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub low: u64,
    pub normal: u64,
    pub high: u64,
    pub urgent: u64,
}

impl PendingCounts {
    pub fn total(&self) -> u64 {
        self.low + self.normal + self.high + self.urgent
    }
}

/// Point-in-time queue depths from the state store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: PendingCounts,
    pub scheduled: u64,
    pub active: u64,
}

/// Snapshot served by the queue-metrics endpoint: store depths plus the
/// engine's recent throughput window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub pending: PendingCounts,
    pub scheduled: u64,
    pub active: u64,
    /// Calls dispatched over the recent window.
    pub dispatched_recent: u64,
    /// Terminal outcomes over the recent window.
    pub completed_recent: u64,
    pub failed_recent: u64,
    /// Window length the recent counters cover, in seconds.
    pub window_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(raw_state: &str, duration: i64, cause: Option<&str>) -> ProviderStatus {
        ProviderStatus {
            raw_state: raw_state.into(),
            hangup_cause: cause.map(String::from),
            duration_seconds: duration,
            answered: duration > 0,
            ended_at: None,
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn live_states_map_per_table() {
        assert_eq!(
            provider("queued", 0, None).classify(5),
            ProviderPhase::Live(CallStatus::Dispatching)
        );
        assert_eq!(
            provider("initiated", 0, None).classify(5),
            ProviderPhase::Live(CallStatus::Dispatching)
        );
        assert_eq!(
            provider("ringing", 0, None).classify(5),
            ProviderPhase::Live(CallStatus::Ringing)
        );
        assert_eq!(
            provider("in-progress", 0, None).classify(5),
            ProviderPhase::Live(CallStatus::InProgress)
        );
    }

    #[test]
    fn completed_above_threshold_is_completed() {
        let phase = provider("completed", 30, Some("normal_clearing")).classify(5);
        assert_eq!(
            phase,
            ProviderPhase::Terminal {
                status: CallStatus::Completed,
                outcome: CallOutcome::Completed,
                hangup_cause: Some("normal_clearing".into()),
            }
        );
    }

    #[test]
    fn short_completed_is_reclassified_as_miss() {
        let phase = provider("completed", 3, None).classify(5);
        match phase {
            ProviderPhase::Terminal { status, outcome, .. } => {
                assert_eq!(status, CallStatus::Completed);
                assert_eq!(outcome, CallOutcome::Missed);
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn short_completed_cause_refines_outcome() {
        let phase = provider("completed", 2, Some("USER_BUSY")).classify(5);
        match phase {
            ProviderPhase::Terminal { outcome, .. } => assert_eq!(outcome, CallOutcome::Busy),
            other => panic!("expected terminal, got {other:?}"),
        }
        let phase = provider("completed", 2, Some("no_answer")).classify(5);
        match phase {
            ProviderPhase::Terminal { outcome, .. } => assert_eq!(outcome, CallOutcome::NoAnswer),
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn provider_failures_map_to_failed() {
        for raw in ["failed", "rejected"] {
            match provider(raw, 0, None).classify(5) {
                ProviderPhase::Terminal { status, .. } => assert_eq!(status, CallStatus::Failed),
                other => panic!("expected terminal for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn busy_and_no_answer_map_to_missed() {
        match provider("busy", 0, None).classify(5) {
            ProviderPhase::Terminal { status, outcome, .. } => {
                assert_eq!(status, CallStatus::Missed);
                assert_eq!(outcome, CallOutcome::Busy);
            }
            other => panic!("expected terminal, got {other:?}"),
        }
        match provider("no-answer", 0, None).classify(5) {
            ProviderPhase::Terminal { status, outcome, .. } => {
                assert_eq!(status, CallStatus::Missed);
                assert_eq!(outcome, CallOutcome::NoAnswer);
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn unknown_raw_state_is_unknown() {
        assert_eq!(provider("tea-break", 0, None).classify(5), ProviderPhase::Unknown);
    }

    #[test]
    fn terminal_statuses_are_terminal() {
        for s in [
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::Missed,
            CallStatus::Cancelled,
        ] {
            assert!(s.is_terminal());
        }
        for s in [
            CallStatus::Pending,
            CallStatus::Scheduled,
            CallStatus::Dispatching,
            CallStatus::Ringing,
            CallStatus::InProgress,
        ] {
            assert!(!s.is_terminal());
        }
    }

    #[test]
    fn priority_rank_round_trips() {
        for p in [
            CallPriority::Low,
            CallPriority::Normal,
            CallPriority::High,
            CallPriority::Urgent,
        ] {
            assert_eq!(CallPriority::from_rank(p.rank()), Some(p));
        }
        assert_eq!(CallPriority::from_rank(9), None);
    }

    #[test]
    fn priority_ordering_follows_urgency() {
        assert!(CallPriority::Urgent > CallPriority::High);
        assert!(CallPriority::High > CallPriority::Normal);
        assert!(CallPriority::Normal > CallPriority::Low);
    }

    #[test]
    fn call_job_serde_round_trip() {
        let mut job = CallJob::new("call-42", "+15550001", "campaign-7");
        job.priority = CallPriority::Urgent;
        job.call_config
            .insert("flow_name".into(), serde_json::json!("survey"));
        job.attempt_log.push(CallAttempt {
            provider_uuid: Some("uuid-1".into()),
            started_at: Utc::now(),
            terminal_status: Some(CallStatus::Completed),
            hangup_cause: Some("normal_clearing".into()),
        });
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: CallJob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(job, decoded);
    }

    #[test]
    fn agent_terminal_phases() {
        let mut status = AgentStatus {
            phase: "in_progress".into(),
            transcript: None,
            recording_ref: None,
            updated_at: None,
            raw: serde_json::json!({}),
        };
        assert!(!status.is_terminal_phase());
        status.phase = "completed".into();
        assert!(status.is_terminal_phase());
        status.phase = "hangup".into();
        assert!(status.is_terminal_phase());
    }
}
