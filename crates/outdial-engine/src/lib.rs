// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Outdial call queue engine.
//!
//! Composes the worker pool ([`Dispatcher`]), the global token bucket
//! ([`RateLimiter`]), and the per-call state machine ([`CallSupervisor`])
//! over the adapter traits defined in `outdial-core`. The dispatcher also
//! runs the scheduled-call promoter, the stuck-call sweeper, and the
//! terminal-job janitor.

pub mod dispatcher;
pub mod limiter;
pub mod metrics;
pub mod retry;
pub mod supervisor;

pub use dispatcher::Dispatcher;
pub use limiter::RateLimiter;
pub use metrics::EngineMetrics;
pub use supervisor::{CallSupervisor, SupervisorTimings};
