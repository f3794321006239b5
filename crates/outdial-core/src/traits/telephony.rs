// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telephony provider trait: place a call, poll its status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ProviderStatus;

/// Parameters for placing one outbound call.
///
/// The answer URL is part of the client's own configuration; `extras`
/// rides along to the provider so the answer webhook can identify the
/// call (it always carries the job id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub call_id: String,
    /// Destination in E.164 form.
    pub phone_number: String,
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// Successful initiation: the provider's handle for the new call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatedCall {
    pub provider_uuid: String,
    /// The provider's initial raw state, usually "queued".
    pub raw_state: String,
}

/// Adapter for the telephony provider's cloud API.
///
/// Errors carry a transient/permanent classification: timeouts and 5xx
/// responses are transient (retried with backoff by the supervisor),
/// other 4xx responses are permanent.
#[async_trait]
pub trait TelephonyClient: Send + Sync {
    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedCall>;

    /// The provider's current view of the call. Ground truth for duration
    /// and hangup cause.
    async fn status(&self, provider_uuid: &str) -> Result<ProviderStatus>;
}
