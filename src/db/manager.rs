//! Connection manager.
//!
//! # Responsibilities
//! - Own the breaker, health state and retry policies for the process
//! - Hand out sessions only when the breaker and health state allow it
//! - Reconnect under its own retry policy when the database went away
//! - Feed every success and failure into the one breaker
//!
//! # Acquisition Flow
//! ```text
//! acquire_session()
//!     → breaker.admit()
//!         Rejected → CircuitOpen (no database contact)
//!         Probe    → forced health check → close circuit or CircuitOpen
//!         Closed   → health check if the interval elapsed
//!     → unhealthy? reconnect() under the reconnection policy
//!     → checkout bounded by pool_timeout
//!     → Session (released on drop)
//! ```
//!
//! # Design Decisions
//! - One explicit instance, created at startup and passed by reference
//!   (cheap `Clone` around an `Arc`)
//! - The manager never holds a session across calls

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{DatabaseConfig, Environment};
use crate::db::engine::Engine;
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::health::checker::HealthChecker;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Admission, CircuitBreaker, CircuitSnapshot};
use crate::resilience::classify::{Classify, ErrorClass};
use crate::resilience::retries::{self, RetryPolicySet};
use crate::resilience::timeouts::with_timeout;

/// State shared by the manager and every session it handed out.
pub(crate) struct Inner<E: Engine> {
    pub(crate) engine: E,
    pub(crate) config: DatabaseConfig,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) health: HealthChecker,
    pub(crate) policies: RetryPolicySet,
}

impl<E: Engine> Inner<E> {
    /// Return a session's connection. Never fails; a failed release only
    /// marks the database unhealthy.
    pub(crate) fn release_connection(&self, session_id: Uuid, conn: E::Connection) {
        match self.engine.release(conn) {
            Ok(()) => {
                metrics::record_session_released();
                tracing::trace!(session_id = %session_id, "Session released");
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to release session, forcing health check"
                );
                self.health.state().mark(false);
            }
        }
    }

    /// Feed a failed statement into the breaker.
    pub(crate) fn record_statement_failure(&self, class: ErrorClass) {
        if class != ErrorClass::Integrity || self.config.circuit_breaker.count_integrity_failures {
            self.breaker.record_failure();
        }
    }
}

/// Serializable view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub environment: Environment,
    pub healthy: bool,
    pub circuit: CircuitSnapshot,
    pub last_health_check_age_secs: Option<f64>,
}

/// Process-wide connection manager.
pub struct ConnectionManager<E: Engine> {
    inner: Arc<Inner<E>>,
}

impl<E: Engine> Clone for ConnectionManager<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> ConnectionManager<E> {
    pub fn new(engine: E, config: DatabaseConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_failure_threshold(),
            config.circuit_breaker_recovery_time(),
        );
        let health = HealthChecker::new(
            config.health_check.interval(),
            config.health_check.timeout(),
        );
        let policies = RetryPolicySet::from_config(&config);

        Self {
            inner: Arc::new(Inner {
                engine,
                config,
                breaker,
                health,
                policies,
            }),
        }
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    pub fn policies(&self) -> &RetryPolicySet {
        &self.inner.policies
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.health.state().is_healthy()
    }

    pub fn should_perform_health_check(&self) -> bool {
        self.inner.health.state().should_perform_health_check()
    }

    /// Establish connectivity at startup under the connection policy.
    ///
    /// Resets the breaker first. Each failed attempt is recorded as a breaker
    /// failure, so a long outage at startup can still open the circuit.
    pub async fn initialize(&self) -> DbResult<()> {
        let inner = &*self.inner;
        inner.breaker.reset();
        tracing::info!(
            environment = %inner.config.environment,
            uri = %inner.config.redacted_uri(),
            max_attempts = inner.policies.connection.max_attempts,
            "Initializing database connection"
        );

        let result = inner
            .policies
            .connection
            .run(move |_| async move {
                let result = inner.health.check(&inner.engine).await;
                if result.is_err() {
                    inner.breaker.record_failure();
                }
                result
            })
            .await;

        match result {
            Ok(()) => {
                inner.breaker.record_success();
                tracing::info!("Database connection established");
                Ok(())
            }
            Err(e) => {
                inner.health.state().mark(false);
                tracing::error!(error = %e, "Database initialization failed");
                Err(e)
            }
        }
    }

    /// Acquire a session. See the module docs for the flow.
    pub async fn acquire_session(&self) -> DbResult<Session<E>> {
        let inner = &*self.inner;

        match inner.breaker.admit() {
            Admission::Rejected {
                failures,
                retry_after,
            } => {
                tracing::debug!(
                    consecutive_failures = failures,
                    retry_after = ?retry_after,
                    "Circuit open, failing fast"
                );
                return Err(DbError::CircuitOpen {
                    failures,
                    retry_after,
                });
            }
            Admission::Probe(permit) => match inner.health.check(&inner.engine).await {
                Ok(()) => permit.succeed(),
                Err(_) => return Err(permit.fail()),
            },
            Admission::Closed => {
                if inner.health.state().should_perform_health_check() {
                    self.check_health().await;
                }
            }
        }

        if !inner.health.state().is_healthy() {
            self.reconnect().await?;
        }

        self.checkout().await
    }

    async fn checkout(&self) -> DbResult<Session<E>> {
        let inner = &*self.inner;
        match with_timeout(inner.config.pool_timeout(), inner.engine.checkout()).await {
            Ok(conn) => {
                inner.breaker.record_success();
                metrics::record_session_acquired();
                let session = Session::new(conn, Arc::clone(&self.inner));
                tracing::trace!(session_id = %session.id(), "Session acquired");
                Ok(session)
            }
            Err(e) => {
                let class = e.classify();
                inner.breaker.record_failure();
                inner.health.state().mark(false);
                match class {
                    // checkout is a single attempt; the reconnect path retries
                    ErrorClass::Transient => Err(retries::exhausted("checkout", 1, e)),
                    ErrorClass::Integrity => {
                        tracing::warn!(error_class = %class, error = %e, "Session checkout failed");
                        Err(DbError::terminal(class, "checkout", Box::new(e)))
                    }
                    ErrorClass::Unexpected => {
                        tracing::error!(error_class = %class, error = %e, "Session checkout failed");
                        Err(DbError::terminal(class, "checkout", Box::new(e)))
                    }
                }
            }
        }
    }

    /// Return a session to the pool. Never fails.
    pub fn release_session(&self, session: Session<E>) {
        session.release();
    }

    /// Run `body` with a session that is released on every exit path:
    /// success, error, panic or cancellation of the enclosing task.
    ///
    /// ```ignore
    /// let name = manager
    ///     .with_session(|session| Box::pin(async move {
    ///         let conn = session.connection_mut()?;
    ///         load_name(conn).await.map_err(|e| DbError::Unexpected(e.into()))
    ///     }))
    ///     .await?;
    /// ```
    pub async fn with_session<T, F>(&self, body: F) -> DbResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session<E>) -> BoxFuture<'s, DbResult<T>>,
    {
        let mut session = self.acquire_session().await?;
        let result = body(&mut session).await;
        self.release_session(session);
        result
    }

    /// Re-establish connectivity under the reconnection policy.
    ///
    /// Gated by the breaker like `acquire_session`. Success restores health
    /// and resets the breaker; exhaustion records one failure.
    pub async fn reconnect(&self) -> DbResult<()> {
        let inner = &*self.inner;

        let permit = match inner.breaker.admit() {
            Admission::Rejected {
                failures,
                retry_after,
            } => {
                return Err(DbError::CircuitOpen {
                    failures,
                    retry_after,
                })
            }
            Admission::Probe(permit) => Some(permit),
            Admission::Closed => None,
        };

        tracing::warn!(
            max_attempts = inner.policies.reconnection.max_attempts,
            "Reconnecting to database"
        );

        let result = inner
            .policies
            .reconnection
            .run(move |_| inner.health.check(&inner.engine))
            .await;

        match (result, permit) {
            (Ok(()), Some(permit)) => {
                permit.succeed();
                tracing::info!("Database reconnected");
                Ok(())
            }
            (Ok(()), None) => {
                inner.breaker.record_success();
                tracing::info!("Database reconnected");
                Ok(())
            }
            (Err(e), Some(permit)) => {
                permit.fail();
                tracing::error!(error = %e, "Reconnection failed");
                Err(e)
            }
            (Err(e), None) => {
                inner.breaker.record_failure();
                tracing::error!(error = %e, "Reconnection failed");
                Err(e)
            }
        }
    }

    /// Run one health check, feed the breaker and return the outcome.
    pub async fn check_health(&self) -> bool {
        let inner = &*self.inner;
        match inner.health.check(&inner.engine).await {
            Ok(()) => {
                inner.breaker.record_success();
                true
            }
            Err(_) => {
                inner.breaker.record_failure();
                false
            }
        }
    }

    /// Close the pool. The manager reports unhealthy afterwards.
    pub async fn dispose(&self) {
        self.inner.engine.dispose().await;
        self.inner.health.state().mark(false);
        tracing::info!("Database connections disposed");
    }

    pub fn status(&self) -> ManagerStatus {
        let inner = &*self.inner;
        ManagerStatus {
            environment: inner.config.environment,
            healthy: inner.health.state().is_healthy(),
            circuit: inner.breaker.snapshot(),
            last_health_check_age_secs: inner
                .health
                .state()
                .last_check_age()
                .map(|age| age.as_secs_f64()),
        }
    }

    pub(crate) fn inner(&self) -> &Inner<E> {
        &self.inner
    }
}
