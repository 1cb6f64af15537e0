//! Background health monitoring.
//!
//! # Responsibilities
//! - Periodically run the rate-limited health check
//! - Reconnect proactively when the database went unhealthy, so the next
//!   request does not pay for it

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::db::engine::Engine;
use crate::db::manager::ConnectionManager;

pub struct HealthMonitor<E: Engine> {
    manager: ConnectionManager<E>,
    interval: Duration,
}

impl<E: Engine> HealthMonitor<E> {
    pub fn new(manager: ConnectionManager<E>) -> Self {
        let interval = manager.config().health_check.interval();
        Self { manager, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Health monitor starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        if self.manager.breaker().is_open() {
            // breaker-gated: fails fast until the recovery window elapses
            if let Err(e) = self.manager.reconnect().await {
                tracing::debug!(error = %e, "Circuit still open");
            }
            return;
        }

        if self.manager.should_perform_health_check() {
            self.manager.check_health().await;
        }

        if !self.manager.is_healthy() {
            if let Err(e) = self.manager.reconnect().await {
                tracing::warn!(error = %e, error_code = e.error_code(), "Background reconnect failed");
            }
        }
    }
}
