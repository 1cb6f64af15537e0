//! Liveness probe against the database.
//!
//! A probe checks out one connection, runs the trivial query and expects
//! the sentinel back. Both steps are bounded by the probe timeout and the
//! connection is always handed back to the engine.

use std::time::Duration;

use crate::db::engine::{ConnectError, Engine, PROBE_SENTINEL};
use crate::health::state::HealthState;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;

#[derive(Debug)]
pub struct HealthChecker {
    state: HealthState,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            state: HealthState::new(interval),
            probe_timeout,
        }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// Probe once without touching the recorded state.
    pub async fn probe<E: Engine>(&self, engine: &E) -> Result<(), ConnectError<E::Error>> {
        let mut conn = with_timeout(self.probe_timeout, engine.checkout()).await?;
        let result = with_timeout(self.probe_timeout, engine.ping(&mut conn)).await;

        if let Err(e) = engine.release(conn) {
            tracing::warn!(error = %e, "Failed to release health probe connection");
        }

        match result? {
            PROBE_SENTINEL => Ok(()),
            other => Err(ConnectError::BadSentinel(other)),
        }
    }

    /// Probe and record the outcome. Feeding the breaker is the caller's job.
    pub async fn check<E: Engine>(&self, engine: &E) -> Result<(), ConnectError<E::Error>> {
        let result = self.probe(engine).await;
        let healthy = result.is_ok();

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Database health check failed");
        } else {
            tracing::debug!("Database health check passed");
        }

        self.state.record_check(healthy);
        metrics::record_health_check(healthy);
        result
    }
}
