// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Outdial call engine.

use thiserror::Error;

use crate::types::CallStatus;

/// The primary error type used across all Outdial adapter traits and core operations.
#[derive(Debug, Error)]
pub enum OutdialError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// State store errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Telephony provider errors. `transient` marks errors eligible for retry
    /// (timeouts, 5xx, connection resets) as opposed to permanent rejections (4xx).
    #[error("telephony error: {message}")]
    Telephony {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Voice-agent service errors.
    #[error("voice agent error: {message}")]
    Agent {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Result sink delivery errors.
    #[error("result sink error: {message}")]
    Sink {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The referenced call does not exist in the state store.
    #[error("call {call_id} not found")]
    NotFound { call_id: String },

    /// A write would overwrite a terminal status. Terminal states are final;
    /// callers treat this as a non-fatal signal that someone else finished first.
    #[error("call {call_id} is already terminal ({status})")]
    TerminalState { call_id: String, status: CallStatus },

    /// Contract violation at the ingress boundary (missing id, malformed spec).
    /// Never mutates state.
    #[error("invalid call request: {0}")]
    InvalidRequest(String),

    /// The operation was interrupted by process shutdown.
    #[error("shutting down")]
    Shutdown,

    /// Internal invariant breach. Contained to a single job; the process continues.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OutdialError {
    /// Returns true for errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            OutdialError::Telephony { transient, .. }
            | OutdialError::Agent { transient, .. }
            | OutdialError::Sink { transient, .. } => *transient,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OutdialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_flag_is_respected() {
        let e = OutdialError::Telephony {
            message: "503".into(),
            transient: true,
            source: None,
        };
        assert!(e.is_transient());

        let e = OutdialError::Telephony {
            message: "400".into(),
            transient: false,
            source: None,
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn non_client_errors_are_never_transient() {
        let e = OutdialError::InvalidRequest("missing id".into());
        assert!(!e.is_transient());
        let e = OutdialError::TerminalState {
            call_id: "c1".into(),
            status: CallStatus::Completed,
        };
        assert!(!e.is_transient());
    }
}
