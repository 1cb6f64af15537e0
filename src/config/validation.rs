//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges on the resolved values (explicit or profile default)
//! - Check the connection string is a usable Postgres URI
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DatabaseConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{DatabaseConfig, LogFormat, RetryLimits};

/// Upper bound on `pool.size + pool.max_overflow`.
pub const MAX_POOL_CONNECTIONS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid database uri: {0}")]
    InvalidUri(String),

    #[error("unknown log format '{0}' (expected json or pretty)")]
    UnknownLogFormat(String),
}

fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> ValidationError {
    ValidationError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

pub fn validate_config(config: &DatabaseConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let policies: [(&'static str, RetryLimits); 3] = [
        ("retry.connection_attempts", config.connection_retry()),
        ("retry.query_attempts", config.query_retry()),
        ("retry.reconnect_attempts", config.reconnect_retry()),
    ];
    for (field, limits) in policies {
        if limits.attempts < 1 {
            errors.push(out_of_range(field, limits.attempts, ">= 1"));
        }
    }

    let jitter = config.jitter_factor();
    if !(0.0..=1.0).contains(&jitter) {
        errors.push(out_of_range("retry.jitter_factor", jitter, "0.0..=1.0"));
    }

    let multiplier = config.retry.multiplier;
    if !multiplier.is_finite() || multiplier < 1.0 {
        errors.push(out_of_range("retry.multiplier", multiplier, ">= 1.0"));
    }

    if config.circuit_breaker_failure_threshold() < 1 {
        errors.push(out_of_range(
            "circuit_breaker.failure_threshold",
            config.circuit_breaker_failure_threshold(),
            ">= 1",
        ));
    }

    if config.circuit_breaker_recovery_time().is_zero() {
        errors.push(out_of_range("circuit_breaker.recovery_time_secs", 0, "> 0"));
    }

    if config.pool_size() < 1 {
        errors.push(out_of_range("pool.size", config.pool_size(), ">= 1"));
    }

    let max_connections = u64::from(config.pool_size()) + u64::from(config.max_overflow());
    if max_connections > u64::from(MAX_POOL_CONNECTIONS) {
        errors.push(out_of_range(
            "pool.max_overflow",
            config.max_overflow(),
            "pool.size + pool.max_overflow <= 1000",
        ));
    }

    if config.pool_timeout().is_zero() {
        errors.push(out_of_range("pool.timeout_secs", 0, "> 0"));
    }

    if config.health_check.interval_secs == 0 {
        errors.push(out_of_range("health_check.interval_secs", 0, "> 0"));
    }

    match config.database_uri() {
        Ok(url) if matches!(url.scheme(), "postgres" | "postgresql") => {}
        Ok(url) => errors.push(ValidationError::InvalidUri(format!(
            "unsupported scheme '{}'",
            url.scheme()
        ))),
        Err(e) => errors.push(ValidationError::InvalidUri(e.to_string())),
    }

    if let Some(format) = &config.observability.log_format {
        if format.parse::<LogFormat>().is_err() {
            errors.push(ValidationError::UnknownLogFormat(format.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
