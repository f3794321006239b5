// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted voice-agent service for engine tests.

use std::sync::Mutex;

use async_trait::async_trait;
use outdial_core::{AgentClient, AgentRegistration, AgentStatus, OutdialError, Result};

/// One scripted agent status answer.
#[derive(Debug, Clone)]
pub enum AgentScript {
    /// The agent does not know the call (404 path).
    NotFound,
    Status {
        phase: String,
        transcript: Option<serde_json::Value>,
        recording_ref: Option<String>,
    },
    Transient(String),
}

#[derive(Default)]
struct Inner {
    register_fails: bool,
    status_script: Vec<AgentScript>,
    registrations: Vec<AgentRegistration>,
    status_calls: u64,
}

/// Mock [`AgentClient`] with scripted responses and recorded registrations.
#[derive(Default)]
pub struct MockVoicebot {
    inner: Mutex<Inner>,
}

impl MockVoicebot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `register` call fail (best-effort path in the supervisor).
    pub fn fail_registrations(&self) {
        self.lock().register_fails = true;
    }

    /// Appends a status answer. Like the telephony mock, the last script
    /// entry holds.
    pub fn push_status(
        &self,
        phase: &str,
        transcript: Option<serde_json::Value>,
        recording_ref: Option<&str>,
    ) {
        self.lock().status_script.push(AgentScript::Status {
            phase: phase.into(),
            transcript,
            recording_ref: recording_ref.map(String::from),
        });
    }

    pub fn push_not_found(&self) {
        self.lock().status_script.push(AgentScript::NotFound);
    }

    pub fn push_transient(&self, message: &str) {
        self.lock()
            .status_script
            .push(AgentScript::Transient(message.into()));
    }

    pub fn registrations(&self) -> Vec<AgentRegistration> {
        self.lock().registrations.clone()
    }

    pub fn status_calls(&self) -> u64 {
        self.lock().status_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AgentClient for MockVoicebot {
    async fn register(&self, registration: &AgentRegistration) -> Result<()> {
        let mut inner = self.lock();
        inner.registrations.push(registration.clone());
        if inner.register_fails {
            return Err(OutdialError::Agent {
                message: "registration refused".into(),
                transient: true,
                source: None,
            });
        }
        Ok(())
    }

    async fn status(&self, _call_id: &str) -> Result<Option<AgentStatus>> {
        let mut inner = self.lock();
        inner.status_calls += 1;
        let script = match inner.status_script.len() {
            0 => AgentScript::NotFound,
            1 => inner.status_script[0].clone(),
            _ => inner.status_script.remove(0),
        };
        match script {
            AgentScript::NotFound => Ok(None),
            AgentScript::Status {
                phase,
                transcript,
                recording_ref,
            } => Ok(Some(AgentStatus {
                phase: phase.clone(),
                transcript: transcript.clone(),
                recording_ref: recording_ref.clone(),
                updated_at: Some(chrono::Utc::now()),
                raw: serde_json::json!({
                    "status": phase,
                    "transcript": transcript,
                    "public_recording_url": recording_ref,
                }),
            })),
            AgentScript::Transient(message) => Err(OutdialError::Agent {
                message,
                transient: true,
                source: None,
            }),
        }
    }
}
