//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Acquisition path (db::manager):
//!     interval elapsed, or circuit eligible for a probe
//!     → checker.rs probes the database
//!     → state.rs records the outcome
//!
//! Background (active.rs):
//!     Periodic timer
//!     → same rate-limited check
//!     → reconnect when unhealthy
//! ```
//!
//! # Design Decisions
//! - One health state for the whole database, not per connection
//! - Checks are rate-limited unless forced by a breaker probe
//! - The breaker is fed by the manager, not by the checker

pub mod active;
pub mod checker;
pub mod state;

pub use active::HealthMonitor;
pub use checker::HealthChecker;
pub use state::HealthState;
