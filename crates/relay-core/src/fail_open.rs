//! Fail-open retry for soft failures
//!
//! Some stages of the pipeline must never surface an error to the loop: a
//! completion request that keeps failing simply means "nothing to execute".
//! These helpers retry an operation a bounded number of times and collapse
//! exhaustion into `None`.
//!
//! DO NOT use fail-open for:
//! - Controller commands (a failed `load` must be visible per action)
//! - Watch transport errors (those reconnect instead)

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Retry an operation with a fixed backoff, failing open on exhaustion
///
/// Runs `f` up to `max_attempts` times (at least once), sleeping `backoff`
/// between attempts. Every failure is logged via `tracing::warn!`; after the
/// last one the function returns `None`.
///
/// # Usage
///
/// ```no_run
/// use relay_core::fail_open::fail_open_with_retries;
/// use relay_core::Result;
/// use std::time::Duration;
///
/// async fn ask() -> Result<Vec<String>> {
///     Ok(vec!["forward.urp".to_string()])
/// }
///
/// async fn example() {
///     let actions = fail_open_with_retries("completion", || ask(), 3, Duration::from_secs(2))
///         .await
///         .unwrap_or_default();
/// }
/// ```
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_attempts: u32,
    backoff: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) => {
                if attempt == max_attempts {
                    warn!(
                        "{} failed after {} attempts (fail-open): {}",
                        operation_name, max_attempts, e
                    );
                    return None;
                }
                warn!(
                    "{} failed (attempt {}/{}), retrying: {}",
                    operation_name, attempt, max_attempts, e
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
    None
}
