// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted telephony provider for engine tests.
//!
//! Initiation outcomes pop off a queue (empty queue means success with a
//! generated UUID). Status responses pop off a queue but HOLD on the last
//! entry, so a script of `initiated, ringing, completed` keeps answering
//! `completed` forever, matching a real provider's terminal stickiness.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use outdial_core::{
    InitiateRequest, InitiatedCall, OutdialError, ProviderStatus, Result, TelephonyClient,
};

/// One scripted initiation outcome.
#[derive(Debug, Clone)]
pub enum InitiateScript {
    Ok { provider_uuid: String },
    Transient(String),
    Permanent(String),
}

/// One scripted status outcome.
#[derive(Debug, Clone)]
pub enum StatusScript {
    State {
        raw_state: String,
        duration_seconds: i64,
        hangup_cause: Option<String>,
    },
    Transient(String),
    Permanent(String),
}

#[derive(Default)]
struct Inner {
    initiate_script: Vec<InitiateScript>,
    status_script: Vec<StatusScript>,
    initiate_calls: Vec<(Instant, InitiateRequest)>,
    status_calls: u64,
}

/// Mock [`TelephonyClient`] with scripted responses and recorded calls.
#[derive(Default)]
pub struct MockTelephony {
    inner: Mutex<Inner>,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_initiate_ok(&self, provider_uuid: &str) {
        self.lock().initiate_script.push(InitiateScript::Ok {
            provider_uuid: provider_uuid.into(),
        });
    }

    pub fn push_initiate_transient(&self, message: &str) {
        self.lock()
            .initiate_script
            .push(InitiateScript::Transient(message.into()));
    }

    pub fn push_initiate_permanent(&self, message: &str) {
        self.lock()
            .initiate_script
            .push(InitiateScript::Permanent(message.into()));
    }

    /// Appends a provider state to the status script.
    pub fn push_status(&self, raw_state: &str, duration_seconds: i64, hangup_cause: Option<&str>) {
        self.lock().status_script.push(StatusScript::State {
            raw_state: raw_state.into(),
            duration_seconds,
            hangup_cause: hangup_cause.map(String::from),
        });
    }

    pub fn push_status_transient(&self, message: &str) {
        self.lock()
            .status_script
            .push(StatusScript::Transient(message.into()));
    }

    pub fn push_status_permanent(&self, message: &str) {
        self.lock()
            .status_script
            .push(StatusScript::Permanent(message.into()));
    }

    /// Timestamps of every initiate call, for rate-limit assertions.
    pub fn initiate_timestamps(&self) -> Vec<Instant> {
        self.lock().initiate_calls.iter().map(|(t, _)| *t).collect()
    }

    /// Call ids in initiation order, for dispatch-order assertions.
    pub fn initiate_call_ids(&self) -> Vec<String> {
        self.lock()
            .initiate_calls
            .iter()
            .map(|(_, request)| request.call_id.clone())
            .collect()
    }

    pub fn initiate_count(&self) -> usize {
        self.lock().initiate_calls.len()
    }

    pub fn status_count(&self) -> u64 {
        self.lock().status_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TelephonyClient for MockTelephony {
    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedCall> {
        let mut inner = self.lock();
        inner
            .initiate_calls
            .push((Instant::now(), request.clone()));
        let script = if inner.initiate_script.is_empty() {
            InitiateScript::Ok {
                provider_uuid: format!("uuid-{}", request.call_id),
            }
        } else {
            inner.initiate_script.remove(0)
        };
        match script {
            InitiateScript::Ok { provider_uuid } => Ok(InitiatedCall {
                provider_uuid,
                raw_state: "queued".into(),
            }),
            InitiateScript::Transient(message) => Err(OutdialError::Telephony {
                message,
                transient: true,
                source: None,
            }),
            InitiateScript::Permanent(message) => Err(OutdialError::Telephony {
                message,
                transient: false,
                source: None,
            }),
        }
    }

    async fn status(&self, _provider_uuid: &str) -> Result<ProviderStatus> {
        let mut inner = self.lock();
        inner.status_calls += 1;
        let script = match inner.status_script.len() {
            0 => StatusScript::State {
                raw_state: "initiated".into(),
                duration_seconds: 0,
                hangup_cause: None,
            },
            1 => inner.status_script[0].clone(), // hold the last entry
            _ => inner.status_script.remove(0),
        };
        match script {
            StatusScript::State {
                raw_state,
                duration_seconds,
                hangup_cause,
            } => Ok(ProviderStatus {
                raw_state: raw_state.clone(),
                hangup_cause,
                duration_seconds,
                answered: duration_seconds > 0,
                ended_at: None,
                raw: serde_json::json!({ "call_state": raw_state }),
            }),
            StatusScript::Transient(message) => Err(OutdialError::Telephony {
                message,
                transient: true,
                source: None,
            }),
            StatusScript::Permanent(message) => Err(OutdialError::Telephony {
                message,
                transient: false,
                source: None,
            }),
        }
    }
}
