// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the voice-agent service.
//!
//! The agent learns about upcoming calls via `POST /start-call` and
//! exposes per-call state at `GET /call-status/{call_id}`. A 404 from the
//! status endpoint means the agent has not registered the call yet (or has
//! already cleaned it up); that is an expected answer, not an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use outdial_config::model::{HttpConfig, VoicebotConfig};
use outdial_core::{AgentClient, AgentRegistration, AgentStatus, OutdialError, Result};

/// HTTP client for the voice-agent service.
#[derive(Debug, Clone)]
pub struct VoicebotClient {
    client: reqwest::Client,
    base_url: String,
}

/// Status body returned by the agent. Field names follow the agent's
/// wire format; `recording_ref` maps from its public recording URL.
#[derive(Debug, Deserialize)]
struct AgentStatusResponse {
    #[serde(default, alias = "phase")]
    status: Option<String>,
    #[serde(default)]
    transcript: Option<serde_json::Value>,
    #[serde(default, alias = "recording_ref")]
    public_recording_url: Option<String>,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl VoicebotClient {
    pub fn new(config: &VoicebotConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_seconds))
            .build()
            .map_err(|e| OutdialError::Agent {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AgentClient for VoicebotClient {
    async fn register(&self, registration: &AgentRegistration) -> Result<()> {
        let url = format!("{}/start-call", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(registration)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        debug!(call_id = %registration.call_id, status = %status, "register response received");

        if status.is_success() {
            return Ok(());
        }
        Err(error_from_status(
            status,
            response.text().await.unwrap_or_default(),
        ))
    }

    async fn status(&self, call_id: &str) -> Result<Option<AgentStatus>> {
        let url = format!("{}/call-status/{call_id}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(map_reqwest_err)?;

        let status = response.status();
        debug!(call_id, status = %status, "status response received");

        if status == StatusCode::NOT_FOUND {
            // Not registered yet, or already cleaned up. Expected.
            return Ok(None);
        }
        if !status.is_success() {
            return Err(error_from_status(
                status,
                response.text().await.unwrap_or_default(),
            ));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| OutdialError::Agent {
            message: format!("failed to parse status response: {e}"),
            transient: false,
            source: Some(Box::new(e)),
        })?;
        let parsed: AgentStatusResponse =
            serde_json::from_value(raw.clone()).map_err(|e| OutdialError::Agent {
                message: format!("unexpected status response shape: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;

        Ok(Some(AgentStatus {
            phase: parsed.status.unwrap_or_else(|| "unknown".to_string()),
            transcript: parsed.transcript,
            recording_ref: parsed.public_recording_url,
            updated_at: parsed.updated_at,
            raw,
        }))
    }
}

fn map_reqwest_err(e: reqwest::Error) -> OutdialError {
    OutdialError::Agent {
        message: format!("HTTP request failed: {e}"),
        transient: true,
        source: Some(Box::new(e)),
    }
}

fn error_from_status(status: StatusCode, body: String) -> OutdialError {
    let transient = matches!(status.as_u16(), 408 | 429) || status.is_server_error();
    OutdialError::Agent {
        message: format!("agent service returned {status}: {body}"),
        transient,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> VoicebotClient {
        VoicebotClient::new(
            &VoicebotConfig {
                base_url: base_url.into(),
            },
            &HttpConfig::default(),
        )
        .unwrap()
    }

    fn registration(call_id: &str) -> AgentRegistration {
        AgentRegistration {
            call_id: call_id.into(),
            phone_number: "+15550001".into(),
            campaign_id: "campaign-1".into(),
            provider_uuid: Some("uuid-1".into()),
            config: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn register_posts_call_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start-call"))
            .and(body_partial_json(serde_json::json!({
                "call_id": "A1",
                "phone_number": "+15550001",
                "provider_uuid": "uuid-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "registered": true
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        client.register(&registration("A1")).await.unwrap();
    }

    #[tokio::test]
    async fn register_failure_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start-call"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.register(&registration("A1")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn status_404_is_none_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call-status/A1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert!(client.status("A1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_parses_transcript_and_recording() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call-status/A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "transcript": ["hi", "bye"],
                "public_recording_url": "https://cdn.example.com/rec/A1.mp3"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let status = client.status("A1").await.unwrap().unwrap();
        assert_eq!(status.phase, "completed");
        assert!(status.is_terminal_phase());
        assert_eq!(status.transcript, Some(serde_json::json!(["hi", "bye"])));
        assert_eq!(
            status.recording_ref.as_deref(),
            Some("https://cdn.example.com/rec/A1.mp3")
        );
    }

    #[tokio::test]
    async fn status_5xx_is_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call-status/A1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.status("A1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn status_without_phase_defaults_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/call-status/A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transcript": []
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let status = client.status("A1").await.unwrap().unwrap();
        assert_eq!(status.phase, "unknown");
        assert!(!status.is_terminal_phase());
    }
}
