use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Run a polling operation with capped exponential backoff. Transient
/// failures retry up to `attempts` times; exhaustion or `Ok(None)` both
/// mean "no data this cycle" and are never surfaced as errors.
pub async fn poll_with_retry<T, F, Fut>(attempts: u32, base_delay: Duration, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let attempts = attempts.max(1);
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return value,
            Err(err) => {
                warn!(attempt, error = %err, "poll attempt failed");
                if attempt + 1 < attempts {
                    let delay = base_delay * 2u32.saturating_pow(attempt);
                    sleep(delay.min(MAX_RETRY_DELAY)).await;
                }
            }
        }
    }
    None
}
