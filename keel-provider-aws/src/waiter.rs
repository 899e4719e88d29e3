//! Status polling for asynchronous AWS operations

use std::future::Future;
use std::time::Duration;

use keel_core::provider::{ProviderError, ProviderErrorKind, ProviderResult};

/// Upper bound on polls when no poll interval is configured
const MAX_IMMEDIATE_ATTEMPTS: u32 = 120;

/// Outcome of a single status poll
pub enum Poll<T> {
    Done(T),
    Pending(String),
}

/// Poll until `probe` reports done, an error occurs, or `timeout` elapses
pub async fn wait_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut probe: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<Poll<T>>>,
{
    let max_attempts = if poll_interval.is_zero() {
        MAX_IMMEDIATE_ATTEMPTS
    } else {
        let attempts = timeout.as_millis() / poll_interval.as_millis().max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    };

    let mut last_status = String::new();
    for attempt in 1..=max_attempts {
        match probe().await? {
            Poll::Done(value) => return Ok(value),
            Poll::Pending(status) => {
                log::debug!("waiting for {} ({}), attempt {}", what, status, attempt);
                last_status = status;
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    Err(ProviderError::new(format!(
        "Timed out after {:?} waiting for {} (last status: {})",
        timeout, what, last_status
    ))
    .with_kind(ProviderErrorKind::Timeout))
}
