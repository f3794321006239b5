// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend result-sink client for the Outdial call engine.
//!
//! Implements the [`ResultSink`](outdial_core::ResultSink) trait against
//! the campaign backend's call-updates endpoint.

pub mod client;

pub use client::BackendSink;
