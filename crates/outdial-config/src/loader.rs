// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./outdial.toml` > `~/.config/outdial/outdial.toml`
//! > `/etc/outdial/outdial.toml`, with environment variable overrides via the
//! `OUTDIAL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::OutdialConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/outdial/outdial.toml` (system-wide)
/// 3. `~/.config/outdial/outdial.toml` (user XDG config)
/// 4. `./outdial.toml` (local directory)
/// 5. `OUTDIAL_*` environment variables
pub fn load_config() -> Result<OutdialConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<OutdialConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OutdialConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<OutdialConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OutdialConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading (exposed for diagnostics).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(OutdialConfig::default()))
        .merge(Toml::file("/etc/outdial/outdial.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("outdial/outdial.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("outdial.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `OUTDIAL_QUEUE_MAX_CONCURRENT_CALLS`
/// must map to `queue.max_concurrent_calls`, not `queue.max.concurrent.calls`.
fn env_provider() -> Env {
    Env::prefixed("OUTDIAL_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: OUTDIAL_PLIVO_AUTH_TOKEN -> "plivo_auth_token"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("supervisor_", "supervisor.", 1)
            .replacen("sweeper_", "sweeper.", 1)
            .replacen("plivo_", "plivo.", 1)
            .replacen("voicebot_", "voicebot.", 1)
            .replacen("backend_", "backend.", 1)
            .replacen("http_", "http.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
