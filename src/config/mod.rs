//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (dotenvy) → process environment
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, apply env overrides)
//!     → validation.rs (semantic checks)
//!     → DatabaseConfig (validated, immutable)
//!     → owned by the ConnectionManager
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Unset knobs resolve against the environment profile at read time, so
//!   switching `ENVIRONMENT` rescales everything not explicitly set
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, ConnectionConfig, DatabaseConfig, Environment, HealthCheckConfig,
    LogFormat, ObservabilityConfig, PoolConfig, RetryConfig, RetryLimits,
};
pub use validation::{validate_config, ValidationError};
