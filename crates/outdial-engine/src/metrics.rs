// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recent-throughput counters behind the queue-metrics endpoint.
//!
//! Store depths come from the state store at query time; this tracker only
//! keeps the sliding window of dispatches and terminal outcomes that the
//! store cannot answer cheaply.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use outdial_core::{QueueCounts, QueueMetrics};

/// Sliding-window dispatch/outcome counters.
pub struct EngineMetrics {
    window: Duration,
    dispatched: Mutex<VecDeque<Instant>>,
    outcomes: Mutex<VecDeque<(Instant, bool)>>,
}

impl EngineMetrics {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            dispatched: Mutex::new(VecDeque::new()),
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_dispatch(&self) {
        let now = Instant::now();
        let mut dispatched = self.dispatched.lock().unwrap_or_else(|e| e.into_inner());
        dispatched.push_back(now);
        Self::trim(&mut dispatched, now, self.window);
    }

    /// Records a terminal outcome; `success` means the call completed.
    pub fn record_outcome(&self, success: bool) {
        let now = Instant::now();
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes.push_back((now, success));
        while let Some(&(t, _)) = outcomes.front() {
            if now.duration_since(t) > self.window {
                outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn trim(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&t) = entries.front() {
            if now.duration_since(t) > window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Combines the window counters with store depths into the snapshot
    /// served by the metrics endpoint.
    pub fn snapshot(&self, counts: QueueCounts) -> QueueMetrics {
        let now = Instant::now();
        let dispatched_recent = {
            let mut dispatched = self.dispatched.lock().unwrap_or_else(|e| e.into_inner());
            Self::trim(&mut dispatched, now, self.window);
            dispatched.len() as u64
        };
        let (completed_recent, failed_recent) = {
            let outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
            let mut completed = 0;
            let mut failed = 0;
            for &(t, success) in outcomes.iter() {
                if now.duration_since(t) <= self.window {
                    if success {
                        completed += 1;
                    } else {
                        failed += 1;
                    }
                }
            }
            (completed, failed)
        };
        QueueMetrics {
            pending: counts.pending,
            scheduled: counts.scheduled,
            active: counts.active,
            dispatched_recent,
            completed_recent,
            failed_recent,
            window_seconds: self.window.as_secs(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
