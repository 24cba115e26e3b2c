// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Bounded retry for backend calls.
//!
//! Every stage transition wraps its backend call in [`attempt`], which
//! retries transient failures a fixed number of times with a fixed
//! delay. [`poll_ready`] covers the dual case of waiting for an
//! artifact that a slow backend produces out of band.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per transition.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Retry policy for backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and delay.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the
/// attempt budget is exhausted.
///
/// Only errors whose [`Error::is_retryable`] is true trigger another
/// attempt; the last underlying error is returned on exhaustion.
pub async fn attempt<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_attempt = policy.max_attempts.max(1);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && last_attempt > 1 => {
                last_attempt -= 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Poll `probe` until it reports an artifact, up to the policy's
/// attempt budget.
///
/// `probe` returns `Ok(Some(value))` when the artifact is available,
/// `Ok(None)` when it is not there yet. Exhaustion maps to
/// [`Error::NotReady`] so callers can distinguish "still pending" from
/// a hard failure.
pub async fn poll_ready<T, F, Fut>(policy: RetryPolicy, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if attempt < max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(Error::NotReady {
        attempts: max_attempts,
    })
}
