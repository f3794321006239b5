// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Outdial call engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Outdial configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values except the provider, voicebot, and backend credentials, which
/// are validated as required at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutdialConfig {
    /// Process-level settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Worker pool and rate limiting.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Per-call supervision timings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Stuck-call sweeper thresholds.
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Telephony provider credentials and endpoints.
    #[serde(default)]
    pub plivo: PlivoConfig,

    /// Voice-agent service endpoint.
    #[serde(default)]
    pub voicebot: VoicebotConfig,

    /// Backend result sink endpoint.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Outbound HTTP client behavior.
    #[serde(default)]
    pub http: HttpConfig,

    /// State store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ingress HTTP surface.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Worker pool and rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Size of the worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Hard ceiling on simultaneously supervised calls, independent of
    /// the worker count.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: u64,

    /// Token-bucket refill rate for call initiation.
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,

    /// Worker sleep when the queue is empty, in milliseconds.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_concurrent_calls: default_max_concurrent_calls(),
            rate_limit_per_second: default_rate_limit_per_second(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

fn default_workers() -> usize {
    10
}

fn default_max_concurrent_calls() -> u64 {
    100
}

fn default_rate_limit_per_second() -> u32 {
    10
}

fn default_idle_poll_ms() -> u64 {
    500
}

/// Per-call supervision timings.
///
/// The provider's status is meaningless right after initiation, so the
/// first poll waits out `initial_status_delay_seconds`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Settling delay before the first provider poll.
    #[serde(default = "default_initial_status_delay")]
    pub initial_status_delay_seconds: u64,

    /// Provider poll interval.
    #[serde(default = "default_status_check_interval")]
    pub status_check_interval_seconds: u64,

    /// Initiation attempt ceiling on transient provider errors.
    #[serde(default = "default_max_status_retries")]
    pub max_status_retries: u32,

    /// Wall-clock bound on Dispatching/Ringing before a synthetic miss.
    #[serde(default = "default_stuck_call_deadline")]
    pub stuck_call_deadline_seconds: u64,

    /// "completed" below this duration is reclassified as Missed.
    #[serde(default = "default_min_connected_seconds")]
    pub min_connected_seconds: i64,

    /// Consecutive transient poll errors before the provider is declared
    /// unreachable and an outcome is synthesized.
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Delivery attempt ceiling against the backend sink.
    #[serde(default = "default_delivery_max_attempts")]
    pub delivery_max_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_status_delay_seconds: default_initial_status_delay(),
            status_check_interval_seconds: default_status_check_interval(),
            max_status_retries: default_max_status_retries(),
            stuck_call_deadline_seconds: default_stuck_call_deadline(),
            min_connected_seconds: default_min_connected_seconds(),
            max_poll_failures: default_max_poll_failures(),
            delivery_max_attempts: default_delivery_max_attempts(),
        }
    }
}

fn default_initial_status_delay() -> u64 {
    20
}

fn default_status_check_interval() -> u64 {
    15
}

fn default_max_status_retries() -> u32 {
    3
}

fn default_stuck_call_deadline() -> u64 {
    45
}

fn default_min_connected_seconds() -> i64 {
    5
}

fn default_max_poll_failures() -> u32 {
    6
}

fn default_delivery_max_attempts() -> u32 {
    5
}

/// Second line of defense behind the supervisor's own stuck check, for
/// supervisors that crashed or hung.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,

    /// Force-complete active jobs older than this.
    #[serde(default = "default_hard_deadline")]
    pub hard_deadline_seconds: u64,

    /// Only sweep jobs whose last status update is older than this.
    #[serde(default = "default_stuck_update_threshold")]
    pub stuck_update_threshold_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sweep_interval(),
            hard_deadline_seconds: default_hard_deadline(),
            stuck_update_threshold_seconds: default_stuck_update_threshold(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_hard_deadline() -> u64 {
    300
}

fn default_stuck_update_threshold() -> u64 {
    60
}

/// Telephony provider credentials and endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlivoConfig {
    /// Account auth id. Required.
    #[serde(default)]
    pub auth_id: String,

    /// Account auth token. Required.
    #[serde(default)]
    pub auth_token: String,

    /// Outbound caller number in E.164 form. Required.
    #[serde(default)]
    pub from_number: String,

    /// URL the provider invokes once the call is answered. Required.
    #[serde(default)]
    pub answer_url: String,

    #[serde(default = "default_plivo_base_url")]
    pub base_url: String,
}

impl Default for PlivoConfig {
    fn default() -> Self {
        Self {
            auth_id: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            answer_url: String::new(),
            base_url: default_plivo_base_url(),
        }
    }
}

fn default_plivo_base_url() -> String {
    "https://api.plivo.com".to_string()
}

/// Voice-agent service endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VoicebotConfig {
    /// Base URL of the voice-agent service. Required.
    #[serde(default)]
    pub base_url: String,
}

/// Backend result sink endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// URL receiving final call results. Required.
    #[serde(default)]
    pub sink_url: String,
}

/// Outbound HTTP client behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout for provider, agent, and sink calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// State store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Terminal jobs are retained this long for status queries, then evicted.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// How often the janitor runs eviction.
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            retention_hours: default_retention_hours(),
            janitor_interval_seconds: default_janitor_interval(),
        }
    }
}

fn default_database_path() -> String {
    "outdial.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_retention_hours() -> u64 {
    24
}

fn default_janitor_interval() -> u64 {
    3600
}

/// Ingress HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8088
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OutdialConfig::default();
        assert_eq!(config.queue.workers, 10);
        assert_eq!(config.queue.max_concurrent_calls, 100);
        assert_eq!(config.queue.rate_limit_per_second, 10);
        assert_eq!(config.supervisor.initial_status_delay_seconds, 20);
        assert_eq!(config.supervisor.status_check_interval_seconds, 15);
        assert_eq!(config.supervisor.max_status_retries, 3);
        assert_eq!(config.supervisor.stuck_call_deadline_seconds, 45);
        assert_eq!(config.supervisor.min_connected_seconds, 5);
        assert_eq!(config.supervisor.delivery_max_attempts, 5);
        assert_eq!(config.sweeper.hard_deadline_seconds, 300);
        assert_eq!(config.sweeper.stuck_update_threshold_seconds, 60);
        assert_eq!(config.http.request_timeout_seconds, 30);
        assert_eq!(config.storage.retention_hours, 24);
    }
}
