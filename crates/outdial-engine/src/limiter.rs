// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global token bucket gating call initiation.
//!
//! One bucket for the whole process; urgency is handled by queue ordering
//! alone, so there is no per-priority reservation.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use tokio_util::sync::CancellationToken;

use outdial_core::{OutdialError, Result};

/// Token-bucket rate limiter over call initiations per second.
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl RateLimiter {
    /// Creates a bucket refilling at `rate` tokens per second. A zero rate
    /// is clamped to one.
    pub fn per_second(rate: u32) -> Self {
        let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: GovernorRateLimiter::direct(Quota::per_second(rate)),
        }
    }

    /// Blocks until a token is available or the process is shutting down.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = self.inner.until_ready() => Ok(()),
            _ = cancel.cancelled() => Err(OutdialError::Shutdown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn acquire_is_immediate_with_capacity() {
        let limiter = RateLimiter::per_second(100);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed().as_millis() < 50);
    }

    #[tokio::test]
    async fn sustained_rate_is_bounded() {
        // 10/s means 20 acquisitions need at least ~1s beyond the burst.
        let limiter = RateLimiter::per_second(10);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..20 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert!(
            start.elapsed().as_millis() >= 900,
            "20 tokens at 10/s should take about a second, took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiters() {
        let limiter = RateLimiter::per_second(1);
        let cancel = CancellationToken::new();
        // Drain the bucket.
        limiter.acquire(&cancel).await.unwrap();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, OutdialError::Shutdown));
    }

    #[test]
    fn zero_rate_is_clamped() {
        // Construction must not panic.
        let _ = RateLimiter::per_second(0);
    }
}
