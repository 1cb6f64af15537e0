//! Retrying statement executor.
//!
//! Runs one statement on a session the caller already holds. Transient
//! failures are retried on the same session under the query policy;
//! integrity and unexpected failures surface on the attempt that produced
//! them. The executor never acquires or releases sessions.

use futures_util::future::BoxFuture;

use crate::db::engine::Engine;
use crate::db::manager::ConnectionManager;
use crate::db::session::Session;
use crate::error::DbResult;
use crate::resilience::classify::Classify;

impl<E: Engine> ConnectionManager<E> {
    /// Execute `statement` against `session` with class-specific retry.
    ///
    /// `statement` is called once per attempt with the session's connection.
    /// Every failure is fed into the breaker (integrity failures only when
    /// `circuit_breaker.count_integrity_failures` is set); a success resets
    /// its counter.
    ///
    /// ```ignore
    /// let id: i64 = manager
    ///     .execute_with_retry(&mut session, |conn| {
    ///         Box::pin(sqlx::query_scalar("INSERT INTO users (email) VALUES ($1) RETURNING id")
    ///             .bind(&email)
    ///             .fetch_one(&mut **conn))
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute_with_retry<T, F>(&self, session: &mut Session<E>, mut statement: F) -> DbResult<T>
    where
        F: for<'c> FnMut(&'c mut E::Connection) -> BoxFuture<'c, Result<T, E::Error>>,
    {
        let inner = self.inner();
        let mut retry = inner.policies.query.start();

        loop {
            let conn = session.connection_mut()?;
            match statement(conn).await {
                Ok(value) => {
                    retry.succeeded();
                    inner.breaker.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    let class = e.classify();
                    tracing::debug!(
                        session_id = %session.id(),
                        attempt = retry.attempt(),
                        error_class = %class,
                        error = %e,
                        "Statement failed"
                    );
                    inner.record_statement_failure(class);
                    retry.backoff_or_fail_classified(class, e).await?;
                }
            }
        }
    }
}
