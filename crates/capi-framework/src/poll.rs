//! Polling for conditions driven by controllers outside of the test.
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// The interval between checks for every wait in this crate.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Repeatedly runs `check` until `accept` approves its value or `timeout`
/// elapses.
///
/// The check always runs at least once. Its errors are logged and retried,
/// they only surface as the `last_observed` part of the [`Error::Timeout`]
/// returned when the deadline passes.
///
/// # Arguments
/// * `description` - What is being waited for, used in logs and the timeout error
/// * `interval` - Time between the end of one check and the start of the next
/// * `timeout` - Maximum wall-clock time to keep checking
/// * `check` - Async closure observing the current state
/// * `accept` - Predicate deciding whether the observed value is the target
pub async fn poll_until<T, F, Fut, P>(
    description: &str,
    interval: Duration,
    timeout: Duration,
    mut check: F,
    mut accept: P,
) -> Result<T>
where
    T: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&T) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let last_observed = match check().await {
            Ok(value) if accept(&value) => {
                debug!(description, attempts, "Condition met");
                return Ok(value);
            }
            Ok(value) => {
                trace!(description, ?value, "Condition not yet met");
                format!("{:?}", value)
            }
            Err(e) => {
                debug!(description, error = %e, "Check failed, retrying");
                e.to_string()
            }
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout {
                description: description.to_owned(),
                timeout,
                last_observed,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// [`poll_until`] for checks that report success as `true`.
pub async fn poll_until_true<F, Fut>(
    description: &str,
    interval: Duration,
    timeout: Duration,
    check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_until(description, interval, timeout, check, |done| *done)
        .await
        .map(|_| ())
}
