//! Timeout wrapper for async operations.

use crate::NimbusError;
use std::time::Duration;

/// Runs an async operation, failing with [`NimbusError::Timeout`] once
/// `duration` elapses.
///
/// `operation` names the work in the error message.
pub async fn with_timeout<F, Fut, T>(duration: Duration, operation: &str, f: F) -> Result<T, NimbusError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, NimbusError>>,
{
    tokio::time::timeout(duration, f())
        .await
        .map_err(|_| NimbusError::Timeout(format!("{} did not finish within {:?}", operation, duration)))?
}
