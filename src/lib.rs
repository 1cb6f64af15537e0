//! Resilient Postgres connection layer.
//!
//! A process-wide [`ConnectionManager`] wraps a pooled engine with health
//! checks, tiered retry policies, reconnection and a circuit breaker.
//! Callers acquire [`Session`]s from it and run statements through
//! [`ConnectionManager::execute_with_retry`].

pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{DatabaseConfig, Environment};
pub use db::{ConnectionManager, Engine, ManagerStatus, PgEngine, Session};
pub use error::{DbError, DbResult};
pub use lifecycle::Shutdown;
pub use resilience::{Classify, ErrorClass};
