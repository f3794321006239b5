// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the Plivo REST surface.

use serde::{Deserialize, Serialize};

/// Body of `POST /v1/Account/{auth_id}/Call/`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCallRequest {
    pub from: String,
    pub to: String,
    pub answer_url: String,
    pub answer_method: String,
    pub hangup_url: String,
    pub hangup_method: String,
}

/// Response of a successful call creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCallResponse {
    pub request_uuid: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub api_id: Option<String>,
}

/// Response of `GET /v1/Account/{auth_id}/Call/{uuid}/`.
///
/// Plivo is loose with numeric fields (`call_duration` arrives as either a
/// number or a string), so duration is kept raw and coerced by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct CallDetailsResponse {
    #[serde(default)]
    pub call_uuid: Option<String>,
    #[serde(alias = "call_status")]
    pub call_state: String,
    #[serde(default)]
    pub call_duration: Option<serde_json::Value>,
    #[serde(default)]
    pub hangup_cause: Option<String>,
    #[serde(default)]
    pub answer_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl CallDetailsResponse {
    /// Coerces the duration field to whole seconds, defaulting to 0.
    pub fn duration_seconds(&self) -> i64 {
        match &self.call_duration {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.parse::<f64>().map(|f| f as i64).unwrap_or(0),
            _ => 0,
        }
    }
}

/// Error body Plivo returns on 4xx/5xx.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub api_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_coerces_number_and_string() {
        let details: CallDetailsResponse = serde_json::from_value(serde_json::json!({
            "call_state": "completed",
            "call_duration": 30
        }))
        .unwrap();
        assert_eq!(details.duration_seconds(), 30);

        let details: CallDetailsResponse = serde_json::from_value(serde_json::json!({
            "call_state": "completed",
            "call_duration": "17"
        }))
        .unwrap();
        assert_eq!(details.duration_seconds(), 17);

        let details: CallDetailsResponse = serde_json::from_value(serde_json::json!({
            "call_state": "ringing"
        }))
        .unwrap();
        assert_eq!(details.duration_seconds(), 0);
    }

    #[test]
    fn call_status_alias_is_accepted() {
        let details: CallDetailsResponse = serde_json::from_value(serde_json::json!({
            "call_status": "in-progress"
        }))
        .unwrap();
        assert_eq!(details.call_state, "in-progress");
    }
}
