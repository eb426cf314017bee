//! Bounded polling for resources that settle asynchronously
//!
//! Each backend owns its polling policy; procedures never time out on their own.

use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Polling interval and overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Call `check` until it yields a value or the policy's deadline passes.
///
/// Errors returned by `check` end the wait immediately.
pub async fn poll_until<T, F, Fut>(policy: &PollPolicy, what: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let Some(value) = check().await? {
            tracing::debug!(what, attempt, "Wait finished");
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(CloudError::Timeout(format!(
                "{} (gave up after {:?})",
                what, policy.timeout
            )));
        }
        tracing::debug!(what, attempt, "Still waiting");
        sleep(policy.interval).await;
    }
}
