//! Database health state.
//!
//! # States
//! - Healthy: sessions are handed out directly
//! - Unhealthy: the next acquisition reconnects first
//!
//! # Design Decisions
//! - Checks are rate-limited by `interval` unless forced
//! - A never-checked state is due immediately
//! - State changes logged for observability

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;

#[derive(Debug)]
struct Inner {
    is_healthy: bool,
    last_health_check: Option<Instant>,
}

#[derive(Debug)]
pub struct HealthState {
    inner: Mutex<Inner>,
    interval: Duration,
}

impl HealthState {
    /// Starts unhealthy and due for a check.
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                is_healthy: false,
                last_health_check: None,
            }),
            interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_healthy(&self) -> bool {
        self.lock().is_healthy
    }

    /// True once `interval` has elapsed since the last check.
    pub fn should_perform_health_check(&self) -> bool {
        match self.lock().last_health_check {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Record the outcome of a completed check.
    pub fn record_check(&self, healthy: bool) {
        let mut inner = self.lock();
        inner.last_health_check = Some(Instant::now());
        Self::set(&mut inner, healthy);
    }

    /// Change health without counting as a check (release failure, dispose).
    pub fn mark(&self, healthy: bool) {
        Self::set(&mut self.lock(), healthy);
    }

    fn set(inner: &mut Inner, healthy: bool) {
        if inner.is_healthy != healthy {
            if healthy {
                tracing::info!("Database marked healthy");
            } else {
                tracing::warn!("Database marked unhealthy");
            }
        }
        inner.is_healthy = healthy;
        metrics::record_healthy(healthy);
    }

    /// Time since the last completed check.
    pub fn last_check_age(&self) -> Option<Duration> {
        self.lock().last_health_check.map(|at| at.elapsed())
    }
}
