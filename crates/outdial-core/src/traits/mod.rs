// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the engine's external seams.
//!
//! The dispatcher and supervisors only ever see these traits; concrete
//! clients (Plivo, the voice-agent service, the backend sink, SQLite)
//! live in their own crates and are wired together in the binary.
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod agent;
pub mod sink;
pub mod store;
pub mod telephony;

pub use agent::{AgentClient, AgentRegistration};
pub use sink::ResultSink;
pub use store::{ActiveEntry, PutOutcome, StateStore};
pub use telephony::{InitiateRequest, InitiatedCall, TelephonyClient};
