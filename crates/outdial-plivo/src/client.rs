// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Plivo voice API.
//!
//! Provides [`PlivoClient`] which handles request construction, basic
//! authentication, and transient/permanent error classification. Retry
//! policy lives with the caller (the supervisor records every attempt).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use outdial_config::model::{HttpConfig, PlivoConfig};
use outdial_core::{
    InitiateRequest, InitiatedCall, OutdialError, ProviderStatus, Result, TelephonyClient,
};

use crate::types::{ApiErrorResponse, CallDetailsResponse, CreateCallRequest, CreateCallResponse};

/// HTTP client for Plivo call operations.
#[derive(Debug, Clone)]
pub struct PlivoClient {
    client: reqwest::Client,
    auth_id: String,
    auth_token: String,
    from_number: String,
    answer_url: String,
    base_url: String,
}

impl PlivoClient {
    pub fn new(config: &PlivoConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_seconds))
            .build()
            .map_err(|e| OutdialError::Telephony {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            auth_id: config.auth_id.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            answer_url: config.answer_url.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn call_endpoint(&self) -> String {
        format!("{}/v1/Account/{}/Call/", self.base_url, self.auth_id)
    }

    /// Builds the answer URL with the job id and extras as query
    /// parameters, so the answer webhook can identify the call.
    ///
    /// A job-supplied `answer_url` extra overrides the configured base.
    fn answer_url_for(&self, request: &InitiateRequest) -> Result<String> {
        let base = request
            .extras
            .get("answer_url")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.answer_url);
        let mut url = Url::parse(base).map_err(|e| OutdialError::Telephony {
            message: format!("invalid answer_url `{base}`: {e}"),
            transient: false,
            source: Some(Box::new(e)),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("call_id", &request.call_id);
            for (key, value) in &request.extras {
                if key == "answer_url" {
                    continue;
                }
                if let Some(s) = value.as_str() {
                    pairs.append_pair(key, s);
                } else {
                    pairs.append_pair(key, &value.to_string());
                }
            }
        }
        Ok(url.into())
    }
}

#[async_trait]
impl TelephonyClient for PlivoClient {
    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedCall> {
        let answer_url = self.answer_url_for(request)?;
        let body = CreateCallRequest {
            from: self.from_number.clone(),
            to: request.phone_number.clone(),
            answer_url: answer_url.clone(),
            answer_method: "POST".into(),
            hangup_url: answer_url,
            hangup_method: "POST".into(),
        };

        let response = self
            .client
            .post(self.call_endpoint())
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        debug!(call_id = %request.call_id, status = %status, "initiate response received");

        if status.is_success() {
            let created: CreateCallResponse =
                response.json().await.map_err(|e| OutdialError::Telephony {
                    message: format!("failed to parse initiate response: {e}"),
                    transient: false,
                    source: Some(Box::new(e)),
                })?;
            return Ok(InitiatedCall {
                provider_uuid: created.request_uuid,
                raw_state: "queued".into(),
            });
        }

        Err(error_from_status(status, response.text().await.unwrap_or_default()))
    }

    async fn status(&self, provider_uuid: &str) -> Result<ProviderStatus> {
        let url = format!("{}{}/", self.call_endpoint(), provider_uuid);
        let response = self
            .client
            .get(url)
            .basic_auth(&self.auth_id, Some(&self.auth_token))
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        debug!(provider_uuid, status = %status, "status response received");

        if status.is_success() {
            let raw: serde_json::Value =
                response.json().await.map_err(|e| OutdialError::Telephony {
                    message: format!("failed to parse status response: {e}"),
                    transient: false,
                    source: Some(Box::new(e)),
                })?;
            let details: CallDetailsResponse =
                serde_json::from_value(raw.clone()).map_err(|e| OutdialError::Telephony {
                    message: format!("unexpected status response shape: {e}"),
                    transient: false,
                    source: Some(Box::new(e)),
                })?;
            return Ok(ProviderStatus {
                raw_state: details.call_state.clone(),
                hangup_cause: details.hangup_cause.clone(),
                duration_seconds: details.duration_seconds(),
                answered: details.answer_time.is_some() || details.duration_seconds() > 0,
                ended_at: details.end_time.clone(),
                raw,
            });
        }

        Err(error_from_status(status, response.text().await.unwrap_or_default()))
    }
}

/// Network-level failures (timeouts, connection resets) are transient.
fn map_reqwest_err(e: reqwest::Error) -> OutdialError {
    OutdialError::Telephony {
        message: format!("HTTP request failed: {e}"),
        transient: true,
        source: Some(Box::new(e)),
    }
}

/// Classifies a non-2xx response: 408/429/5xx transient, other 4xx permanent.
fn error_from_status(status: StatusCode, body: String) -> OutdialError {
    let transient = matches!(status.as_u16(), 408 | 429) || status.is_server_error();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_err) => match api_err.error {
            Some(detail) => format!("Plivo API error ({status}): {detail}"),
            None => format!("Plivo API returned {status}"),
        },
        Err(_) => format!("Plivo API returned {status}: {body}"),
    };
    OutdialError::Telephony {
        message,
        transient,
        source: None,
    }
}
