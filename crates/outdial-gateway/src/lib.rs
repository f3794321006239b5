// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP ingress for the Outdial call engine.
//!
//! The campaign backend submits calls here; the engine's workers drain
//! them from the state store. Endpoints: enqueue (single/bulk), status,
//! queued-call cancel, campaign listing, queue metrics, health.

pub mod handlers;
pub mod server;

pub use server::{build_router, start_server, GatewayState};
