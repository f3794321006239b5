// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client delivering final call results to the campaign backend.
//!
//! The backend ingests updates as a JSON array and deduplicates on
//! `call_id`, so redelivery of the same result is safe. One attempt per
//! `deliver` call; the supervisor owns the retry schedule.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use outdial_config::model::{BackendConfig, HttpConfig};
use outdial_core::{CallResult, OutdialError, Result, ResultSink};

/// HTTP client for the backend result sink.
#[derive(Debug, Clone)]
pub struct BackendSink {
    client: reqwest::Client,
    sink_url: String,
}

impl BackendSink {
    pub fn new(config: &BackendConfig, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_seconds))
            .build()
            .map_err(|e| OutdialError::Sink {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            sink_url: config.sink_url.clone(),
        })
    }

    /// Overrides the sink URL (for testing with wiremock).
    pub fn with_sink_url(mut self, url: String) -> Self {
        self.sink_url = url;
        self
    }
}

#[async_trait]
impl ResultSink for BackendSink {
    async fn deliver(&self, result: &CallResult) -> Result<()> {
        // The backend expects an array of updates.
        let payload = serde_json::json!([result]);
        let response = self
            .client
            .post(&self.sink_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OutdialError::Sink {
                message: format!("HTTP request failed: {e}"),
                transient: true,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(call_id = %result.call_id, status = %status, "delivery response received");

        if status.is_success() {
            return Ok(());
        }

        Err(error_from_status(
            status,
            response.text().await.unwrap_or_default(),
        ))
    }
}

fn error_from_status(status: StatusCode, body: String) -> OutdialError {
    let transient = matches!(status.as_u16(), 408 | 429) || status.is_server_error();
    OutdialError::Sink {
        message: format!("backend returned {status}: {body}"),
        transient,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outdial_core::{CallOutcome, CallStatus, DataSource};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result(call_id: &str) -> CallResult {
        CallResult {
            call_id: call_id.into(),
            status: CallStatus::Completed,
            call_outcome: CallOutcome::Completed,
            duration_seconds: 30,
            hangup_cause: Some("normal_clearing".into()),
            transcript: Some(serde_json::json!(["hi", "bye"])),
            recording_ref: None,
            provider_data: None,
            agent_data: None,
            data_source: DataSource::ProviderPrimary,
            reported_at: Some(chrono::Utc::now()),
            reported_ok: false,
        }
    }

    fn test_sink(url: &str) -> BackendSink {
        BackendSink::new(
            &BackendConfig {
                sink_url: format!("{url}/api/calls/external-updates"),
            },
            &HttpConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn delivers_result_as_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/calls/external-updates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "accepted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = test_sink(&server.uri());
        sink.deliver(&result("A1")).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body.is_array());
        assert_eq!(body[0]["call_id"], "A1");
        assert_eq!(body[0]["call_outcome"], "completed");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/calls/external-updates"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let sink = test_sink(&server.uri());
        let err = sink.deliver(&result("A1")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/calls/external-updates"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let sink = test_sink(&server.uri());
        let err = sink.deliver(&result("A1")).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
