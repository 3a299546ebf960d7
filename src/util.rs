//! Small async combinators shared across the pipeline.

use std::future::Future;
use std::time::Duration;

/// Run an async operation up to `attempts` times with a fixed delay between
/// tries. Returns the first success or the last error.
pub async fn with_retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    for attempt in 1..attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "attempt failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
    op().await
}
