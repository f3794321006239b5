// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend result sink trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CallResult;

/// Receives the consolidated outcome of a finished call.
///
/// One delivery attempt per call; retry policy lives with the caller.
/// The backend deduplicates on `call_id`, so redelivering the same
/// result is safe.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, result: &CallResult) -> Result<()>;
}
