// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording result sink for engine tests.

use std::sync::Mutex;

use async_trait::async_trait;
use outdial_core::{CallResult, OutdialError, Result, ResultSink};

#[derive(Default)]
struct Inner {
    delivered: Vec<CallResult>,
    /// Outcomes consumed before deliveries succeed: true = transient
    /// failure, false = permanent failure.
    failures: Vec<bool>,
    attempts: u64,
}

/// Mock [`ResultSink`] recording every delivered result.
#[derive(Default)]
pub struct MockSink {
    inner: Mutex<Inner>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` delivery attempts fail with transient errors.
    pub fn fail_next_transient(&self, n: usize) {
        self.lock().failures.extend(std::iter::repeat(true).take(n));
    }

    /// The next delivery attempt fails permanently.
    pub fn fail_next_permanent(&self) {
        self.lock().failures.push(false);
    }

    /// Successfully delivered results, in order.
    pub fn delivered(&self) -> Vec<CallResult> {
        self.lock().delivered.clone()
    }

    /// Total delivery attempts, including failed ones.
    pub fn attempts(&self) -> u64 {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ResultSink for MockSink {
    async fn deliver(&self, result: &CallResult) -> Result<()> {
        let mut inner = self.lock();
        inner.attempts += 1;
        if !inner.failures.is_empty() {
            let transient = inner.failures.remove(0);
            return Err(OutdialError::Sink {
                message: "scripted delivery failure".into(),
                transient,
                source: None,
            });
        }
        inner.delivered.push(result.clone());
        Ok(())
    }
}
