//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Database call:
//!     → circuit_breaker.rs (fail fast while open, single probe when eligible)
//!     → timeouts.rs (bound checkout / probe)
//!     → On failure: classify.rs (Transient / Integrity / Unexpected)
//!     → retries.rs (retry transient failures with backoff.rs waits)
//!     → circuit_breaker.rs (record failure or success)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every checkout and probe has a deadline
//! - Every failure is classified exactly once, then branched on
//! - Circuit breaker prevents hammering a database that is down

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod retries;
pub mod timeouts;

pub use backoff::Backoff;
pub use circuit_breaker::{Admission, CircuitBreaker, CircuitSnapshot, CircuitState, ProbePermit};
pub use classify::{Classify, ErrorClass};
pub use retries::{RetryPolicy, RetryPolicySet, RetryState};
