use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::EngineError;
use crate::metrics::Counters;

const BACKOFF_STEP: Duration = Duration::from_millis(10);

/// Runs `attempt` until it succeeds, fails with a non-transient error, or
/// `max_retries + 1` attempts have been spent.
pub(super) async fn with_retries<T, F, Fut>(
    operation: &'static str,
    max_retries: u32,
    counters: &Counters,
    mut attempt: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let max_attempts = max_retries.saturating_add(1);
    let mut n: u32 = 0;

    loop {
        n += 1;
        match attempt().await {
            Err(EngineError::Transient(last)) => {
                if n >= max_attempts {
                    return Err(EngineError::RetriesExhausted {
                        operation,
                        attempts: n,
                        last,
                    });
                }

                Counters::incr(&counters.tx_retries);
                warn!(operation, attempt = n, error = %last, "transient store conflict; retrying");
                tokio::time::sleep(BACKOFF_STEP * n).await;
            }
            other => return other,
        }
    }
}
