//! Shared utilities for integration and load testing.
//!
//! `FakeEngine` is a scriptable in-memory engine: flip it down or up, make
//! releases or commits fail, slow down checkouts, and count every call.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use resilient_db::config::{DatabaseConfig, Environment};
use resilient_db::resilience::{Classify, ErrorClass};
use resilient_db::{ConnectionManager, Engine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FakeError {
    #[error("connection refused")]
    Transient,
    #[error("duplicate key value violates unique constraint \"users_email_key\"")]
    Integrity,
    #[error("syntax error at or near \"SELEC\"")]
    Unexpected,
}

impl Classify for FakeError {
    fn classify(&self) -> ErrorClass {
        match self {
            FakeError::Transient => ErrorClass::Transient,
            FakeError::Integrity => ErrorClass::Integrity,
            FakeError::Unexpected => ErrorClass::Unexpected,
        }
    }
}

#[derive(Debug)]
pub struct FakeConn {
    pub id: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    down: AtomicBool,
    fail_release: AtomicBool,
    sentinel: AtomicI64,
    checkout_delay_ms: AtomicU64,
    commit_error: Mutex<Option<FakeError>>,
    checkouts: AtomicU32,
    pings: AtomicU32,
    releases: AtomicU32,
    begins: AtomicU32,
    commits: AtomicU32,
    rollbacks: AtomicU32,
    disposed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct FakeEngine {
    state: Arc<FakeState>,
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new() -> Self {
        let state = FakeState::default();
        state.sentinel.store(1, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }

    pub fn set_fail_release(&self, fail: bool) {
        self.state.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn set_sentinel(&self, value: i64) {
        self.state.sentinel.store(value, Ordering::SeqCst);
    }

    pub fn set_checkout_delay(&self, delay: Duration) {
        self.state
            .checkout_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_commit_error(&self, error: Option<FakeError>) {
        *self.state.commit_error.lock().unwrap() = error;
    }

    pub fn checkouts(&self) -> u32 {
        self.state.checkouts.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u32 {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u32 {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> u32 {
        self.state.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> u32 {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u32 {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<(), FakeError> {
        if self.state.down.load(Ordering::SeqCst) {
            Err(FakeError::Transient)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    type Connection = FakeConn;
    type Error = FakeError;

    async fn checkout(&self) -> Result<FakeConn, FakeError> {
        let id = self.state.checkouts.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.checkout_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check_up()?;
        Ok(FakeConn { id })
    }

    async fn ping(&self, _conn: &mut FakeConn) -> Result<i64, FakeError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        // let concurrent callers interleave with an in-flight probe
        tokio::task::yield_now().await;
        self.check_up()?;
        Ok(self.state.sentinel.load(Ordering::SeqCst))
    }

    fn release(&self, _conn: FakeConn) -> Result<(), FakeError> {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_release.load(Ordering::SeqCst) {
            return Err(FakeError::Transient);
        }
        Ok(())
    }

    async fn begin(&self, _conn: &mut FakeConn) -> Result<(), FakeError> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        self.check_up()
    }

    async fn commit(&self, _conn: &mut FakeConn) -> Result<(), FakeError> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        match *self.state.commit_error.lock().unwrap() {
            Some(e) => Err(e),
            None => self.check_up(),
        }
    }

    async fn rollback(&self, _conn: &mut FakeConn) -> Result<(), FakeError> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.check_up()
    }

    async fn dispose(&self) {
        self.state.disposed.store(true, Ordering::SeqCst);
    }
}

/// Recorder that counts `db_retry_exhausted_total` increments. Install it
/// with `metrics::with_local_recorder` around a current-thread runtime.
#[derive(Debug, Default)]
pub struct ExhaustionRecorder {
    exhausted: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl ExhaustionRecorder {
    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::SeqCst)
    }
}

impl Recorder for ExhaustionRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        if key.name() == "db_retry_exhausted_total" {
            Counter::from_arc(Arc::clone(&self.exhausted))
        } else {
            Counter::noop()
        }
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Fast, deterministic configuration: no jitter, 10ms initial backoff,
/// threshold 3, 30s recovery, health checks only when forced or after an
/// hour.
#[allow(dead_code)]
pub fn test_config() -> DatabaseConfig {
    let mut config = DatabaseConfig::for_environment(Environment::Testing);
    config.retry.initial_wait_ms = 10;
    config.retry.jitter_factor = Some(0.0);
    config.retry.connection_attempts = Some(3);
    config.retry.reconnect_attempts = Some(1);
    config.retry.query_attempts = Some(3);
    config.circuit_breaker.failure_threshold = Some(3);
    config.circuit_breaker.recovery_time_secs = Some(30);
    config.health_check.interval_secs = 3600;
    config
}

#[allow(dead_code)]
pub fn manager(engine: &FakeEngine, config: DatabaseConfig) -> ConnectionManager<FakeEngine> {
    ConnectionManager::new(engine.clone(), config)
}

/// Manager over a healthy engine, already initialized.
#[allow(dead_code)]
pub async fn initialized(engine: &FakeEngine, config: DatabaseConfig) -> ConnectionManager<FakeEngine> {
    let manager = manager(engine, config);
    manager.initialize().await.unwrap();
    manager
}
