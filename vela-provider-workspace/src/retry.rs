//! Retry loops for busy remote objects

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::Instant;
use vela_core::provider::{ErrorKind, ProviderError, ProviderResult};

/// Run `op`, retrying after `interval` while it fails with a conflict (HTTP 409).
///
/// At most `max_retries` retries are made, so `op` runs up to
/// `max_retries + 1` times. Any other error is returned at once.
pub async fn retry_on_conflict<T, F, Fut>(
    max_retries: u32,
    interval: Duration,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_conflict() && retries < max_retries => {
                retries += 1;
                warn!(
                    "resource busy, retrying in {:?} ({}/{}): {}",
                    interval, retries, max_retries, err
                );
                tokio::time::sleep(interval).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run `op`, retrying after `interval` while `should_retry` accepts the
/// error and `timeout` has not elapsed.
pub async fn retry_while<T, F, Fut, P>(
    timeout: Duration,
    interval: Duration,
    should_retry: P,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
    P: Fn(&ProviderError) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if should_retry(&err) => {
                if Instant::now() + interval > deadline {
                    return Err(ProviderError::new(format!(
                        "timeout after {:?} while retrying: {}",
                        timeout, err.message
                    ))
                    .with_kind(ErrorKind::Timeout));
                }
                warn!("retrying in {:?}: {}", interval, err);
                tokio::time::sleep(interval).await;
            }
            Err(err) => return Err(err),
        }
    }
}
