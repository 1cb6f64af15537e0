//! Failure injection tests for the connection manager.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_db::db::in_transaction;
use resilient_db::health::HealthMonitor;
use resilient_db::resilience::CircuitState;
use resilient_db::{DbError, ErrorClass, Shutdown};

mod common;

use common::{FakeEngine, FakeError};

/// Statement that counts its executions and fails with `error` every time.
fn failing_statement(
    calls: &Arc<AtomicU32>,
    error: FakeError,
) -> impl for<'c> FnMut(&'c mut common::FakeConn) -> futures_util::future::BoxFuture<'c, Result<(), FakeError>> {
    let calls = Arc::clone(calls);
    move |_conn| {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(error)
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_then_recovers_after_probe() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    engine.set_down(true);

    // checkout failure, then two failed reconnects
    for expected_failures in 1..=3 {
        let err = manager.acquire_session().await.unwrap_err();
        assert!(
            matches!(err, DbError::RetryExhausted { attempts: 1, .. }),
            "call {expected_failures}: {err:?}"
        );
        assert_eq!(manager.breaker().consecutive_failures(), expected_failures);
    }
    assert!(manager.breaker().is_open());

    // 4th call fails fast without touching the database
    let checkouts = engine.checkouts();
    let err = manager.acquire_session().await.unwrap_err();
    assert!(matches!(err, DbError::CircuitOpen { failures: 3, .. }));
    assert_eq!(err.error_code(), "CIRCUIT_OPEN");
    assert_eq!(engine.checkouts(), checkouts);

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(matches!(
        manager.acquire_session().await,
        Err(DbError::CircuitOpen { .. })
    ));
    assert_eq!(engine.checkouts(), checkouts);

    engine.set_down(false);
    tokio::time::advance(Duration::from_secs(2)).await;

    let session = manager.acquire_session().await.unwrap();
    assert!(!manager.breaker().is_open());
    assert_eq!(manager.breaker().consecutive_failures(), 0);
    assert!(manager.is_healthy());
    manager.release_session(session);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_keeps_circuit_open() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    engine.set_down(true);

    for _ in 0..3 {
        let _ = manager.acquire_session().await;
    }
    assert!(manager.breaker().is_open());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(manager.breaker().state(), CircuitState::HalfOpen);

    let pings = engine.pings();
    let err = manager.acquire_session().await.unwrap_err();
    assert!(matches!(err, DbError::CircuitOpen { failures: 4, .. }));
    assert!(manager.breaker().is_open());
    assert_eq!(manager.breaker().consecutive_failures(), 4);
    // the probe checked out but never reached the ping
    assert_eq!(engine.pings(), pings);

    // recovery window restarted by the failed probe
    assert_eq!(manager.breaker().state(), CircuitState::Open);
}

#[tokio::test]
async fn test_unique_violation_is_not_retried() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    let mut session = manager.acquire_session().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let err = manager
        .execute_with_retry(&mut session, failing_statement(&calls, FakeError::Integrity))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, DbError::Integrity(_)));
    assert_eq!(err.class(), ErrorClass::Integrity);
    assert!(!err.is_recoverable());
    // counted towards the breaker by default
    assert_eq!(manager.breaker().consecutive_failures(), 1);
}

#[tokio::test]
async fn test_integrity_failures_can_be_exempted_from_breaker() {
    let engine = FakeEngine::new();
    let mut config = common::test_config();
    config.circuit_breaker.count_integrity_failures = false;
    let manager = common::initialized(&engine, config).await;
    let mut session = manager.acquire_session().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    for _ in 0..5 {
        let result = manager
            .execute_with_retry(&mut session, failing_statement(&calls, FakeError::Integrity))
            .await;
        assert!(matches!(result, Err(DbError::Integrity(_))));
    }

    assert_eq!(manager.breaker().consecutive_failures(), 0);
    assert!(!manager.breaker().is_open());
}

#[tokio::test(start_paused = true)]
async fn test_transient_statement_retried_exactly_max_attempts() {
    let engine = FakeEngine::new();
    let mut config = common::test_config();
    config.circuit_breaker.failure_threshold = Some(100);
    let manager = common::initialized(&engine, config).await;
    let mut session = manager.acquire_session().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let err = manager
        .execute_with_retry(&mut session, failing_statement(&calls, FakeError::Transient))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        DbError::RetryExhausted {
            operation,
            attempts,
            source,
        } => {
            assert_eq!(operation, "query");
            assert_eq!(attempts, 3);
            assert_eq!(source.to_string(), "connection refused");
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    assert_eq!(manager.breaker().consecutive_failures(), 3);
    // retries reuse the same session: initialize probe + one checkout
    assert_eq!(engine.checkouts(), 2);
}

#[tokio::test]
async fn test_unexpected_statement_error_surfaces_unchanged() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    let mut session = manager.acquire_session().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let err = manager
        .execute_with_retry(&mut session, failing_statement(&calls, FakeError::Unexpected))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.error_code(), "INTERNAL_ERROR");
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("syntax error at or near \"SELEC\""));
}

#[tokio::test(start_paused = true)]
async fn test_statement_recovers_and_resets_counter() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    let mut session = manager.acquire_session().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let rows = manager
        .execute_with_retry(&mut session, move |conn| {
            let counter = Arc::clone(&counter);
            let conn_id = conn.id;
            Box::pin(async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(FakeError::Transient),
                    _ => Ok(conn_id),
                }
            })
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(rows, 1);
    assert_eq!(manager.breaker().consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_exhausts_connection_policy() {
    let engine = FakeEngine::new();
    engine.set_down(true);
    let mut config = common::test_config();
    config.circuit_breaker.failure_threshold = Some(10);
    let manager = common::manager(&engine, config);

    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        DbError::RetryExhausted {
            operation: "connection",
            attempts: 3,
            ..
        }
    ));
    assert!(!manager.is_healthy());
    assert!(!manager.breaker().is_open());
    assert_eq!(manager.breaker().consecutive_failures(), 3);
    assert_eq!(engine.checkouts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_initialize_failures_open_circuit() {
    let engine = FakeEngine::new();
    engine.set_down(true);
    let mut config = common::test_config();
    config.circuit_breaker.failure_threshold = Some(2);
    let manager = common::manager(&engine, config);

    assert!(manager.initialize().await.is_err());
    assert!(manager.breaker().is_open());
    assert!(matches!(
        manager.acquire_session().await,
        Err(DbError::CircuitOpen { .. })
    ));

    // initialize starts from a reset breaker
    engine.set_down(false);
    manager.initialize().await.unwrap();
    assert!(!manager.breaker().is_open());
    assert!(manager.is_healthy());
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let engine = FakeEngine::new();
    let manager = common::manager(&engine, common::test_config());

    manager.initialize().await.unwrap();
    let first = manager.status();
    manager.initialize().await.unwrap();
    let second = manager.status();

    assert!(first.healthy && second.healthy);
    assert_eq!(first.circuit.state, CircuitState::Closed);
    assert_eq!(second.circuit.state, CircuitState::Closed);
    assert_eq!(second.circuit.consecutive_failures, 0);
}

#[tokio::test]
async fn test_bad_sentinel_is_unexpected_and_not_retried() {
    let engine = FakeEngine::new();
    engine.set_sentinel(0);
    let manager = common::manager(&engine, common::test_config());

    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(err, DbError::Unexpected(_)));
    assert!(err.to_string().contains("liveness probe returned 0"));
    assert_eq!(engine.checkouts(), 1);
    assert_eq!(engine.releases(), 1);
}

#[tokio::test]
async fn test_release_failure_forces_reconnect() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;

    engine.set_fail_release(true);
    let session = manager.acquire_session().await.unwrap();
    manager.release_session(session);
    assert!(!manager.is_healthy());

    engine.set_fail_release(false);
    let pings = engine.pings();
    let session = manager.acquire_session().await.unwrap();
    assert_eq!(engine.pings(), pings + 1, "reconnect probe should have run");
    assert!(manager.is_healthy());
    drop(session);
}

#[tokio::test(start_paused = true)]
async fn test_checkout_timeout_is_transient_failure() {
    let engine = FakeEngine::new();
    let mut config = common::test_config();
    config.pool.timeout_secs = Some(1);
    let manager = common::initialized(&engine, config).await;

    engine.set_checkout_delay(Duration::from_secs(5));
    let err = manager.acquire_session().await.unwrap_err();

    assert!(matches!(
        err,
        DbError::RetryExhausted {
            operation: "checkout",
            attempts: 1,
            ..
        }
    ));
    assert!(err.to_string().contains("timed out"));
    assert_eq!(manager.breaker().consecutive_failures(), 1);
    assert!(!manager.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_health_check_due_after_interval() {
    let engine = FakeEngine::new();
    let mut config = common::test_config();
    config.health_check.interval_secs = 10;
    let manager = common::initialized(&engine, config).await;

    let pings = engine.pings();
    drop(manager.acquire_session().await.unwrap());
    assert_eq!(engine.pings(), pings, "check is rate limited");

    tokio::time::advance(Duration::from_secs(10)).await;
    drop(manager.acquire_session().await.unwrap());
    assert_eq!(engine.pings(), pings + 1);
}

#[test]
fn test_transient_checkout_failure_counts_as_exhausted() {
    let recorder = common::ExhaustionRecorder::default();
    let engine = FakeEngine::new();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let err = metrics::with_local_recorder(&recorder, || {
        rt.block_on(async {
            let manager = common::initialized(&engine, common::test_config()).await;
            engine.set_down(true);
            manager.acquire_session().await.unwrap_err()
        })
    });

    assert!(matches!(
        err,
        DbError::RetryExhausted {
            operation: "checkout",
            attempts: 1,
            ..
        }
    ));
    assert_eq!(recorder.exhausted(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_reconnects_and_stops_on_shutdown() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;

    // one failed checkout: unhealthy, circuit still closed
    engine.set_down(true);
    assert!(manager.acquire_session().await.is_err());
    assert!(!manager.is_healthy());
    engine.set_down(false);

    let shutdown = Shutdown::new();
    let monitor = tokio::spawn(HealthMonitor::new(manager.clone()).run(shutdown.subscribe()));

    // the first tick fires immediately
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(manager.is_healthy());
    assert_eq!(manager.breaker().consecutive_failures(), 0);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), monitor)
        .await
        .expect("monitor exits on shutdown")
        .unwrap();
    assert_eq!(shutdown.receiver_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_waits_out_open_circuit() {
    let engine = FakeEngine::new();
    let mut config = common::test_config();
    config.health_check.interval_secs = 10;
    let manager = common::initialized(&engine, config).await;

    engine.set_down(true);
    for _ in 0..3 {
        let _ = manager.acquire_session().await;
    }
    assert!(manager.breaker().is_open());
    engine.set_down(false);

    let shutdown = Shutdown::new();
    let monitor = tokio::spawn(HealthMonitor::new(manager.clone()).run(shutdown.subscribe()));

    // ticks at 0s, 10s and 20s are rejected by the breaker
    let pings = engine.pings();
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(manager.breaker().is_open());
    assert_eq!(engine.pings(), pings);

    // past the 30s recovery window the next tick reconnects and closes it
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(!manager.breaker().is_open());
    assert!(manager.is_healthy());
    assert!(engine.pings() > pings);

    shutdown.trigger();
    monitor.await.unwrap();
}

#[tokio::test]
async fn test_transaction_commits_and_rolls_back() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    let mut session = manager.acquire_session().await.unwrap();

    let value = in_transaction(&mut session, |_session| Box::pin(async { Ok(42) }))
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert_eq!((engine.begins(), engine.commits(), engine.rollbacks()), (1, 1, 0));

    let err = in_transaction(&mut session, |_session| {
        Box::pin(async { Err::<(), _>(DbError::Integrity("duplicate key".into())) })
    })
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::Integrity(_)));
    assert_eq!((engine.begins(), engine.commits(), engine.rollbacks()), (2, 1, 1));
}

#[tokio::test]
async fn test_failed_commit_is_not_retried() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;
    let mut session = manager.acquire_session().await.unwrap();

    engine.set_commit_error(Some(FakeError::Transient));
    let err = in_transaction(&mut session, |_session| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert_eq!(engine.commits(), 1);
    assert!(matches!(
        err,
        DbError::RetryExhausted {
            operation: "integrity",
            attempts: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_dispose_marks_unhealthy() {
    let engine = FakeEngine::new();
    let manager = common::initialized(&engine, common::test_config()).await;

    manager.dispose().await;
    assert!(engine.disposed());
    assert!(!manager.is_healthy());

    let status = serde_json::to_value(manager.status()).unwrap();
    assert_eq!(status["environment"], "testing");
    assert_eq!(status["healthy"], false);
    assert_eq!(status["circuit"]["state"], "closed");
}
