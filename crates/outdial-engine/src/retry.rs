// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Jittered exponential backoff for the supervisor's explicit retry loops.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based): exponential from `base`,
/// capped at `cap`, with full jitter over the upper half so concurrent
/// supervisors do not retry in lockstep.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
    let capped = exp.min(cap);
    let half_ms = (capped.as_millis() / 2) as u64;
    if half_ms == 0 {
        return capped;
    }
    let jitter = rand::rng().random_range(0..=half_ms);
    Duration::from_millis(half_ms + jitter)
}
