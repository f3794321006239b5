// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading and validation for the Outdial call engine.
//!
//! TOML files merged across the XDG hierarchy with `OUTDIAL_*` environment
//! overrides, deserialized into [`model::OutdialConfig`] and validated by
//! [`validation::validate_config`].

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::OutdialConfig;
pub use validation::validate_config;
