use std::future::Future;
use std::time::Duration;

use turnstile_core::{CoreResult, TicketingError};

/// Default bound on a single persistence round trip.
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a persistence call under a deadline. Expiry drops the future, which
/// rolls back any open transaction, and reports `Timeout`.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Persistence call timed out");
            Err(TicketingError::Timeout {
                operation,
                elapsed: limit,
            })
        }
    }
}
