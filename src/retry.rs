//! Bounded retry with fixed backoff.
//!
//! [`retry`] invokes a fallible async operation up to a configured number of
//! attempts, sleeping a fixed delay between them and logging each failed
//! attempt. There is no exponential growth and no jitter; the fixed delay
//! matches the recovery windows of the schema registry and broker during
//! rolling deploys. [`retry_with_context`] additionally threads a cloneable
//! context (a cancellation token, a trace context) into the operation
//! unchanged.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt count, fixed backoff, and a diagnostic label for one retried call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub label: String,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration, label: impl Into<String>) -> Self {
        Self {
            attempts,
            backoff,
            label: label.into(),
        }
    }
}

/// Runs `op` up to `policy.attempts` times, returning the first success or
/// the last error once attempts are exhausted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_context(policy, (), |()| op()).await
}

/// Like [`retry`], but passes `ctx` into each invocation unchanged.
pub async fn retry_with_context<T, C, F, Fut>(policy: &RetryPolicy, ctx: C, mut op: F) -> Result<T>
where
    C: Clone,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if policy.attempts == 0 {
        return Err(Error::Config(format!(
            "retry '{}' configured with zero attempts",
            policy.label
        )));
    }

    let mut last_err = None;
    for attempt in 1..=policy.attempts {
        match op(ctx.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    label = %policy.label,
                    attempt,
                    attempts = policy.attempts,
                    error = %e,
                    "Attempt failed"
                );
                last_err = Some(e);
                if attempt < policy.attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    // attempts >= 1, so at least one error was recorded
    Err(last_err.expect("retry loop ran at least once"))
}
