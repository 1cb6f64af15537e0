//! Configuration loading from disk and the process environment.
//!
//! Precedence, highest first: environment variable, TOML file value,
//! environment-profile default. A `.env` file in the working directory is
//! loaded into the process environment before anything is read.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::DatabaseConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid database uri: {0}")]
    InvalidUri(String),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the environment and validate.
pub fn load_config(path: Option<&Path>) -> Result<DatabaseConfig, ConfigError> {
    if let Ok(dotenv) = dotenvy::dotenv() {
        tracing::debug!(path = %dotenv.display(), "Loaded .env file");
    }

    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => DatabaseConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Apply environment variable overrides. `lookup` resolves a variable name.
pub fn apply_env_overrides<F>(config: &mut DatabaseConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    macro_rules! set {
        ($var:literal => Some $field:expr) => {
            if let Some(value) = lookup($var) {
                $field = Some(parse($var, &value)?);
            }
        };
        ($var:literal => $field:expr) => {
            if let Some(value) = lookup($var) {
                $field = parse($var, &value)?;
            }
        };
    }

    set!("ENVIRONMENT" => config.environment);

    let conn = &mut config.connection;
    set!("POSTGRES_HOST" => conn.host);
    set!("POSTGRES_PORT" => conn.port);
    set!("POSTGRES_USER" => conn.user);
    set!("POSTGRES_PASSWORD" => conn.password);
    set!("POSTGRES_DB" => conn.database);
    set!("POSTGRES_URI" => Some conn.uri);

    let pool = &mut config.pool;
    set!("POSTGRES_POOL_SIZE" => Some pool.size);
    set!("POSTGRES_MAX_OVERFLOW" => Some pool.max_overflow);
    set!("POSTGRES_POOL_TIMEOUT" => Some pool.timeout_secs);
    set!("POSTGRES_POOL_RECYCLE" => Some pool.recycle_secs);
    if let Some(value) = lookup("POSTGRES_POOL_PRE_PING") {
        pool.pre_ping = parse_bool("POSTGRES_POOL_PRE_PING", &value)?;
    }

    let retry = &mut config.retry;
    set!("POSTGRES_CONNECTION_RETRY_ATTEMPTS" => Some retry.connection_attempts);
    set!("POSTGRES_CONNECTION_RETRY_MAX_WAIT" => Some retry.connection_max_wait_secs);
    set!("POSTGRES_QUERY_RETRY_ATTEMPTS" => Some retry.query_attempts);
    set!("POSTGRES_QUERY_RETRY_MAX_WAIT" => Some retry.query_max_wait_secs);
    set!("POSTGRES_RECONNECT_RETRY_ATTEMPTS" => Some retry.reconnect_attempts);
    set!("POSTGRES_RECONNECT_RETRY_MAX_WAIT" => Some retry.reconnect_max_wait_secs);
    set!("POSTGRES_JITTER_FACTOR" => Some retry.jitter_factor);

    let breaker = &mut config.circuit_breaker;
    set!("POSTGRES_CIRCUIT_BREAKER_FAILURE_THRESHOLD" => Some breaker.failure_threshold);
    set!("POSTGRES_CIRCUIT_BREAKER_RECOVERY_TIME" => Some breaker.recovery_time_secs);

    let observability = &mut config.observability;
    set!("LOG_LEVEL" => observability.log_level);
    set!("LOG_FORMAT" => Some observability.log_format);

    Ok(())
}
