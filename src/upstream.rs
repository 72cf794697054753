//! Deadline for calls into external collaborators (database, token issuer,
//! mailer). A call that outlives it fails with `UpstreamTimeout`.

use crate::error::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;

pub async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(call = what, timeout_ms = limit.as_millis() as u64, "upstream call timed out");
            Err(AppError::UpstreamTimeout(format!(
                "{what} did not respond within {}ms",
                limit.as_millis()
            )))
        }
    }
}
