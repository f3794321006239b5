// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock adapters and an engine harness for Outdial integration tests.
//!
//! The mocks implement the core adapter traits with scripted responses;
//! [`harness::EngineHarness`] assembles them with a real SQLite store and
//! a running dispatcher on millisecond timings.

pub mod harness;
pub mod mock_sink;
pub mod mock_telephony;
pub mod mock_voicebot;

pub use harness::{fast_timings, test_job, EngineHarness};
pub use mock_sink::MockSink;
pub use mock_telephony::MockTelephony;
pub use mock_voicebot::MockVoicebot;
