//! Bounded polling

use std::future::Future;

use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::StackWaitOptions;
use crate::errors::DeployerError;

/// Poll `check` until it yields a value, the deadline passes or `cancelled`
/// reports true.
///
/// `check` returning `Ok(None)` means "not yet"; errors end the wait
/// immediately.
pub async fn wait_until<T, F, Fut, C>(
    what: &str,
    options: StackWaitOptions,
    cancelled: C,
    mut check: F,
) -> Result<T, DeployerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, DeployerError>>,
    C: Fn() -> bool,
{
    let poll = async {
        let mut attempt = 0u32;
        loop {
            if cancelled() {
                return Err(DeployerError::Cancelled(what.to_string()));
            }
            attempt += 1;
            if let Some(value) = check().await? {
                return Ok(value);
            }
            debug!("Waiting for {} (attempt {})", what, attempt);
            sleep(options.poll_interval).await;
        }
    };

    match timeout(options.timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(DeployerError::Timeout(format!(
            "{} after {}s",
            what,
            options.timeout.as_secs_f64()
        ))),
    }
}
