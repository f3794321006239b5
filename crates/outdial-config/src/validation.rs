// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: required credentials, parseable URLs, sane numeric ranges.

use url::Url;

use crate::model::OutdialConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err` with all collected
/// validation errors (does not fail fast).
pub fn validate_config(config: &OutdialConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for (value, key) in [
        (&config.plivo.auth_id, "plivo.auth_id"),
        (&config.plivo.auth_token, "plivo.auth_token"),
        (&config.plivo.from_number, "plivo.from_number"),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{key} is required"));
        }
    }

    for (value, key) in [
        (&config.plivo.answer_url, "plivo.answer_url"),
        (&config.plivo.base_url, "plivo.base_url"),
        (&config.voicebot.base_url, "voicebot.base_url"),
        (&config.backend.sink_url, "backend.sink_url"),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{key} is required"));
        } else if Url::parse(value).is_err() {
            errors.push(format!("{key} `{value}` is not a valid URL"));
        }
    }

    if config.queue.workers == 0 {
        errors.push("queue.workers must be at least 1".to_string());
    }
    if config.queue.max_concurrent_calls == 0 {
        errors.push("queue.max_concurrent_calls must be at least 1".to_string());
    }
    if config.queue.rate_limit_per_second == 0 {
        errors.push("queue.rate_limit_per_second must be at least 1".to_string());
    }
    if config.supervisor.min_connected_seconds < 0 {
        errors.push(format!(
            "supervisor.min_connected_seconds must be non-negative, got {}",
            config.supervisor.min_connected_seconds
        ));
    }
    if config.supervisor.delivery_max_attempts == 0 {
        errors.push("supervisor.delivery_max_attempts must be at least 1".to_string());
    }
    if config.storage.database_path.trim().is_empty() {
        errors.push("storage.database_path must not be empty".to_string());
    }
    if config.storage.retention_hours == 0 {
        errors.push("storage.retention_hours must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutdialConfig;

    fn valid_config() -> OutdialConfig {
        let mut config = OutdialConfig::default();
        config.plivo.auth_id = "MA_TEST".into();
        config.plivo.auth_token = "token".into();
        config.plivo.from_number = "+15550100".into();
        config.plivo.answer_url = "https://agent.example.com/outbound-answer".into();
        config.voicebot.base_url = "https://agent.example.com".into();
        config.backend.sink_url = "https://backend.example.com/api/calls/external-updates".into();
        config
    }

    #[test]
    fn complete_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn missing_credentials_are_all_reported() {
        let errors = validate_config(&OutdialConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("plivo.auth_id")));
        assert!(errors.iter().any(|e| e.contains("plivo.auth_token")));
        assert!(errors.iter().any(|e| e.contains("voicebot.base_url")));
        assert!(errors.iter().any(|e| e.contains("backend.sink_url")));
    }

    #[test]
    fn bad_url_is_rejected() {
        let mut config = valid_config();
        config.backend.sink_url = "not a url".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("backend.sink_url")));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = valid_config();
        config.queue.workers = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("queue.workers")));
    }
}
