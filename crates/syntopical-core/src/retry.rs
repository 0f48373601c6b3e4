//! Bounded retry for calls to external services.

use std::future::Future;

use crate::error::Result;

/// How many times a transient failure is retried. The pipeline never retries
/// more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy { max_retries: 0 };

    /// Clamp to the supported range of zero or one retry.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.min(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Run `op`, retrying immediately while it fails with a transient error and
/// retries remain. Non-transient errors are returned on first occurrence.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(operation = what, attempt, error = %e, "transient failure, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
