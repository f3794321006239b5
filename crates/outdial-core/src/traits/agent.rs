// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice-agent service trait: register a pending call, poll its
//! per-call status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::AgentStatus;

/// Tells the voice-agent service to expect an inbound media leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub call_id: String,
    pub phone_number: String,
    pub campaign_id: String,
    #[serde(default)]
    pub provider_uuid: Option<String>,
    /// The job's opaque call_config, forwarded untouched.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Adapter for the voice-agent service.
///
/// `status` returning `Ok(None)` means the agent does not know the call
/// yet, which is expected early in a call's life and never an error. Agent data
/// is advisory: it supplies transcript and recording references but is
/// never authoritative for call termination.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn register(&self, registration: &AgentRegistration) -> Result<()>;

    async fn status(&self, call_id: &str) -> Result<Option<AgentStatus>>;
}
