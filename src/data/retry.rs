//! Bounded retry for backend connection at startup

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::metrics::STORAGE_CONNECT_ATTEMPTS;

/// Call `connect` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the first success, or the last error once the budget is spent.
/// Request handlers never go through here.
pub async fn connect_with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut connect: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let max_attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match connect().await {
            Ok(value) => {
                STORAGE_CONNECT_ATTEMPTS
                    .with_label_values(&["success"])
                    .inc();
                return Ok(value);
            }
            Err(e) => {
                STORAGE_CONNECT_ATTEMPTS
                    .with_label_values(&["failure"])
                    .inc();

                if attempt >= max_attempts {
                    tracing::error!(attempt, error = %e, "Storage connection failed, giving up");
                    return Err(e);
                }

                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %e,
                    "Storage connection failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
