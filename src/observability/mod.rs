//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resilience / health / db produce:
//!     → tracing events (structured fields, installed by logging.rs)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON in production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Unexpected failures carry `error_class = "unexpected"` for alerting
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
