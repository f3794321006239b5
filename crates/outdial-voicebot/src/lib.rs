// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice-agent service client for the Outdial call engine.
//!
//! Implements the [`AgentClient`](outdial_core::AgentClient) trait: call
//! registration before dial-out and opportunistic status/transcript polls
//! during supervision.

pub mod client;

pub use client::VoicebotClient;
