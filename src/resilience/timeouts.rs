//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound pool checkout by `pool_timeout`
//! - Bound health probes by the probe timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timeout is a distinct error that classifies as transient, so it feeds
//!   the breaker and the retry policies like any connectivity failure

use std::future::Future;
use std::time::Duration;

use crate::db::engine::ConnectError;

/// Run `fut` with a deadline.
pub async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, ConnectError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ConnectError::Driver(e)),
        Err(_) => Err(ConnectError::TimedOut(limit)),
    }
}
