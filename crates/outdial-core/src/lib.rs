// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Outdial call engine.
//!
//! This crate provides the shared data model (jobs, results, status
//! enums), the error type, and the adapter traits implemented by the
//! telephony, voice-agent, sink, and storage crates.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{OutdialError, Result};
pub use traits::{
    ActiveEntry, AgentClient, AgentRegistration, InitiateRequest, InitiatedCall, PutOutcome,
    ResultSink, StateStore, TelephonyClient,
};
pub use types::{
    AgentStatus, AttemptClose, CallAttempt, CallJob, CallOutcome, CallPriority, CallResult,
    CallStatus, DataSource, JobPatch, PendingCounts, ProviderPhase, ProviderStatus, QueueCounts,
    QueueMetrics,
};
