// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plivo client crate for the Outdial call engine.
//!
//! Implements the [`TelephonyClient`](outdial_core::TelephonyClient) trait
//! against Plivo's REST API: call creation and call-status polling with
//! transient/permanent error classification.

pub mod client;
pub mod types;

pub use client::PlivoClient;
