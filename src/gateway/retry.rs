// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Fixed-delay retry for backend-mode calls
//!
//! Backend proxy calls are retried a small, fixed number of times with a
//! constant delay; the error surfaced after exhaustion is the one from the
//! last attempt, not an aggregate.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Result;

/// Retry policy: total attempts and the fixed delay between them
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Run an operation under a fixed-delay retry policy.
///
/// The delay is a suspension point, not a busy wait. Streaming calls never
/// go through here; a stream that has yielded bytes cannot be replayed.
pub async fn with_fixed_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) if attempt == attempts => {
                warn!(
                    operation = operation_name,
                    attempts, %error,
                    "exhausted retries, surfacing last error"
                );
                return Err(error);
            }
            Err(error) => {
                warn!(
                    operation = operation_name,
                    attempt, %error,
                    "attempt failed, retrying after fixed delay"
                );
                sleep(policy.delay).await;
            }
        }
    }

    unreachable!("retry loop always returns within the attempt budget")
}
