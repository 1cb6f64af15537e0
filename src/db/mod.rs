//! Database access subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → manager.rs (breaker gating, health, reconnect, checkout)
//!     → session.rs (one pooled connection, released on drop)
//!     → executor.rs (statement retry on the same session)
//!     → transaction.rs (begin / commit / rollback scoping)
//!     → engine.rs (driver seam) → postgres.rs (sqlx pool)
//! ```

pub mod engine;
pub mod executor;
pub mod manager;
pub mod postgres;
pub mod session;
pub mod transaction;

pub use engine::{ConnectError, Engine, PROBE_SENTINEL};
pub use manager::{ConnectionManager, ManagerStatus};
pub use postgres::PgEngine;
pub use session::Session;
pub use transaction::in_transaction;
