//! The seam between the connection layer and a concrete database driver.
//!
//! Everything above this trait (breaker, retries, health, sessions) is
//! driver-agnostic. [`PgEngine`](crate::db::postgres::PgEngine) implements it
//! over sqlx; tests implement it with a scriptable in-memory engine.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::resilience::classify::{Classify, ErrorClass};

/// Value the liveness probe must return.
pub const PROBE_SENTINEL: i64 = 1;

/// A pooled database engine.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// One checked-out pooled connection.
    type Connection: Send + 'static;

    /// Driver error, classified once per failure.
    type Error: std::error::Error + Classify + Send + Sync + 'static;

    /// Take a connection from the pool.
    async fn checkout(&self) -> Result<Self::Connection, Self::Error>;

    /// Run the trivial liveness query and return its value.
    async fn ping(&self, conn: &mut Self::Connection) -> Result<i64, Self::Error>;

    /// Return a connection to the pool. Synchronous so it can run from `Drop`.
    fn release(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    async fn begin(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    async fn commit(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    async fn rollback(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Close the pool. Outstanding connections are closed as they return.
    async fn dispose(&self);
}

/// Failure establishing or probing a connection.
#[derive(Debug, Error)]
pub enum ConnectError<E> {
    #[error(transparent)]
    Driver(E),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("liveness probe returned {0}, expected 1")]
    BadSentinel(i64),
}

impl<E: Classify> Classify for ConnectError<E> {
    fn classify(&self) -> ErrorClass {
        match self {
            ConnectError::Driver(e) => e.classify(),
            ConnectError::TimedOut(_) => ErrorClass::Transient,
            // the database answered, but not with what a live server returns
            ConnectError::BadSentinel(_) => ErrorClass::Unexpected,
        }
    }
}
