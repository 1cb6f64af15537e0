//! Retry policies.
//!
//! # Responsibilities
//! - Hold the four named policies (connection, reconnection, query, integrity)
//! - Classify each failure once and branch on the class
//! - Sleep the jittered backoff between attempts
//! - Surface a distinct `RetryExhausted` once attempts run out
//!
//! # Design Decisions
//! - Only transient failures are ever retried
//! - Integrity and unexpected failures surface on the attempt that produced them
//! - `max_attempts` counts executions, not retries
//! - The retry loop is an explicit state object so callers holding borrowed
//!   state (an open session) can drive it without closures

use std::future::Future;

use crate::config::DatabaseConfig;
use crate::error::{BoxError, DbError, DbResult};
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::resilience::classify::{Classify, ErrorClass};

const TRANSIENT_ONLY: &[ErrorClass] = &[ErrorClass::Transient];

/// A named retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Policy name, also used as the operation label in logs and metrics.
    pub name: &'static str,
    /// Total executions allowed, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Failure classes that may be retried under this policy.
    pub retryable: &'static [ErrorClass],
}

impl RetryPolicy {
    /// Policy retrying transient failures.
    pub fn transient(name: &'static str, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            name,
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: TRANSIENT_ONLY,
        }
    }

    /// Single-attempt policy that never retries anything.
    pub fn no_retry(name: &'static str, backoff: Backoff) -> Self {
        Self {
            name,
            max_attempts: 1,
            backoff,
            retryable: &[],
        }
    }

    pub fn retries(&self, class: ErrorClass) -> bool {
        self.retryable.contains(&class)
    }

    /// Begin a retry loop driven by the caller.
    ///
    /// ```ignore
    /// let mut retry = policy.start();
    /// loop {
    ///     match op().await {
    ///         Ok(v) => return Ok(v),
    ///         Err(e) => retry.backoff_or_fail(e).await?,
    ///     }
    /// }
    /// ```
    pub fn start(&self) -> RetryState<'_> {
        RetryState {
            policy: self,
            attempt: 1,
        }
    }

    /// Run `op` under this policy. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> DbResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        let mut retry = self.start();
        loop {
            match op(retry.attempt()).await {
                Ok(value) => {
                    retry.succeeded();
                    return Ok(value);
                }
                Err(e) => retry.backoff_or_fail(e).await?,
            }
        }
    }
}

/// Progress of one retry loop.
#[derive(Debug)]
pub struct RetryState<'p> {
    policy: &'p RetryPolicy,
    attempt: u32,
}

impl RetryState<'_> {
    /// The attempt currently executing (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.policy
    }

    /// Log recovery when an attempt after the first succeeds.
    pub fn succeeded(&self) {
        if self.attempt > 1 {
            tracing::info!(
                operation = self.policy.name,
                attempts = self.attempt,
                "Database operation recovered after retry"
            );
        }
    }

    /// Classify `err` and either sleep before the next attempt (`Ok`) or
    /// return the error that ends the loop.
    pub async fn backoff_or_fail<E>(&mut self, err: E) -> DbResult<()>
    where
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        let class = err.classify();
        self.backoff_or_fail_classified(class, err).await
    }

    /// As [`backoff_or_fail`](Self::backoff_or_fail), for callers that
    /// already classified `err`.
    pub async fn backoff_or_fail_classified<E>(&mut self, class: ErrorClass, err: E) -> DbResult<()>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let operation = self.policy.name;
        let retryable = self.policy.retries(class);

        if !retryable && class != ErrorClass::Transient {
            match class {
                ErrorClass::Unexpected => tracing::error!(
                    operation,
                    attempt = self.attempt,
                    error_class = %class,
                    error = %err,
                    "Unexpected database error, not retrying"
                ),
                _ => tracing::warn!(
                    operation,
                    attempt = self.attempt,
                    error_class = %class,
                    error = %err,
                    "Non-retryable database error"
                ),
            }
            return Err(DbError::terminal(class, operation, Box::new(err)));
        }

        // a transient failure under a single-shot policy is exhausted too
        if !retryable || self.attempt >= self.policy.max_attempts {
            return Err(exhausted(operation, self.attempt, err));
        }

        let delay = self.policy.backoff.delay(self.attempt);
        tracing::info!(
            operation,
            attempt = self.attempt,
            max_attempts = self.policy.max_attempts,
            delay = ?delay,
            error = %err,
            "Retrying database operation"
        );
        metrics::record_retry(operation);
        tokio::time::sleep(delay).await;
        self.attempt += 1;
        Ok(())
    }
}

/// Log, count and wrap a transient failure that has no attempts left.
pub(crate) fn exhausted<E>(operation: &'static str, attempts: u32, err: E) -> DbError
where
    E: std::error::Error + Send + Sync + 'static,
{
    tracing::error!(
        operation,
        attempts,
        error = %err,
        "Retry attempts exhausted"
    );
    metrics::record_retry_exhausted(operation);
    DbError::RetryExhausted {
        operation,
        attempts,
        source: Box::new(err) as BoxError,
    }
}

/// The four named policies, built once from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicySet {
    /// Initial connection at startup.
    pub connection: RetryPolicy,
    /// Re-establishing connectivity after the manager went unhealthy.
    pub reconnection: RetryPolicy,
    /// Single statement execution on an acquired session.
    pub query: RetryPolicy,
    /// Operations whose outcome is unknown after a failure (transaction
    /// commit). Always one attempt.
    pub integrity: RetryPolicy,
}

impl RetryPolicySet {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let backoff = |max_wait| Backoff {
            initial: config.retry.initial_wait(),
            multiplier: config.retry.multiplier,
            max_wait,
            jitter: config.jitter_factor(),
        };

        let connection = config.connection_retry();
        let reconnection = config.reconnect_retry();
        let query = config.query_retry();

        Self {
            connection: RetryPolicy::transient(
                "connection",
                connection.attempts,
                backoff(connection.max_wait),
            ),
            reconnection: RetryPolicy::transient(
                "reconnection",
                reconnection.attempts,
                backoff(reconnection.max_wait),
            ),
            query: RetryPolicy::transient("query", query.attempts, backoff(query.max_wait)),
            integrity: RetryPolicy::no_retry("integrity", backoff(query.max_wait)),
        }
    }
}
