//! Configuration schema definitions.
//!
//! Every section derives Serde traits and defaults every field, so an empty
//! TOML file is a valid configuration. Values left unset (`None`) fall back
//! to the defaults of the selected [`Environment`] profile.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::loader::ConfigError;

/// Deployment environment. Selects the default magnitudes for pool sizing,
/// retry limits and breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }

    /// Profile defaults for this environment.
    pub fn defaults(&self) -> EnvironmentDefaults {
        match self {
            Environment::Development => EnvironmentDefaults {
                pool_size: 5,
                max_overflow: 10,
                pool_timeout_secs: 30,
                pool_recycle_secs: 1800,
                connection: RetryLimits::secs(20, 30),
                query: RetryLimits::secs(5, 10),
                reconnect: RetryLimits::secs(15, 20),
                failure_threshold: 5,
                recovery_time_secs: 30,
                jitter_factor: 0.3,
            },
            Environment::Testing => EnvironmentDefaults {
                pool_size: 3,
                max_overflow: 5,
                pool_timeout_secs: 10,
                pool_recycle_secs: 300,
                connection: RetryLimits::secs(10, 10),
                query: RetryLimits::secs(3, 5),
                reconnect: RetryLimits::secs(8, 8),
                failure_threshold: 3,
                recovery_time_secs: 15,
                jitter_factor: 0.2,
            },
            Environment::Production => EnvironmentDefaults {
                pool_size: 10,
                max_overflow: 20,
                pool_timeout_secs: 60,
                pool_recycle_secs: 3600,
                connection: RetryLimits::secs(30, 60),
                query: RetryLimits::secs(10, 20),
                reconnect: RetryLimits::secs(25, 45),
                failure_threshold: 10,
                recovery_time_secs: 60,
                jitter_factor: 0.5,
            },
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Attempt count and backoff ceiling of one retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLimits {
    /// Total executions, including the first.
    pub attempts: u32,
    pub max_wait: Duration,
}

impl RetryLimits {
    const fn secs(attempts: u32, max_wait_secs: u64) -> Self {
        Self {
            attempts,
            max_wait: Duration::from_secs(max_wait_secs),
        }
    }
}

/// Environment-scaled defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentDefaults {
    pub pool_size: u32,
    pub max_overflow: u32,
    pub pool_timeout_secs: u64,
    pub pool_recycle_secs: u64,
    pub connection: RetryLimits,
    pub query: RetryLimits,
    pub reconnect: RetryLimits,
    pub failure_threshold: u32,
    pub recovery_time_secs: u64,
    pub jitter_factor: f64,
}

/// Root configuration for the connection layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Profile selecting the defaults below.
    pub environment: Environment,

    /// Where the database lives.
    pub connection: ConnectionConfig,

    /// Pool sizing overrides.
    pub pool: PoolConfig,

    /// Backoff curve and retry-limit overrides.
    pub retry: RetryConfig,

    /// Breaker overrides.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Database location and credentials.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,

    /// Full connection string. Takes precedence over the components above.
    pub uri: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "app".to_string(),
            uri: None,
        }
    }
}

// Keeps the password out of `{:?}` output.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("uri", &self.uri.as_ref().map(|uri| redact(uri)))
            .finish()
    }
}

/// Pool settings. `None` means "use the environment default".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections kept open.
    pub size: Option<u32>,

    /// Extra connections allowed above `size` under load.
    pub max_overflow: Option<u32>,

    /// Checkout timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Maximum connection lifetime in seconds.
    pub recycle_secs: Option<u64>,

    /// Test connections before handing them out.
    pub pre_ping: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: None,
            max_overflow: None,
            timeout_secs: None,
            recycle_secs: None,
            pre_ping: true,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First backoff wait in milliseconds.
    pub initial_wait_ms: u64,

    /// Exponential growth factor of the backoff.
    pub multiplier: f64,

    /// Multiplicative jitter in `[0.0, 1.0]`.
    pub jitter_factor: Option<f64>,

    pub connection_attempts: Option<u32>,
    pub connection_max_wait_secs: Option<u64>,
    pub query_attempts: Option<u32>,
    pub query_max_wait_secs: Option<u64>,
    pub reconnect_attempts: Option<u32>,
    pub reconnect_max_wait_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_wait_ms: 1000,
            multiplier: 2.0,
            jitter_factor: None,
            connection_attempts: None,
            connection_max_wait_secs: None,
            query_attempts: None,
            query_max_wait_secs: None,
            reconnect_attempts: None,
            reconnect_max_wait_secs: None,
        }
    }
}

impl RetryConfig {
    pub fn initial_wait(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: Option<u32>,

    /// Seconds after the last failure before a probe is allowed.
    pub recovery_time_secs: Option<u64>,

    /// Whether constraint violations count as breaker failures.
    pub count_integrity_failures: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: None,
            recovery_time_secs: None,
            count_integrity_failures: true,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Minimum seconds between non-forced health checks.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 5,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// `json` or `pretty`. Unset picks json in production.
    pub log_format: Option<String>,

    /// Install the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Defaults for `environment` with nothing overridden.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    fn defaults(&self) -> EnvironmentDefaults {
        self.environment.defaults()
    }

    pub fn pool_size(&self) -> u32 {
        self.pool.size.unwrap_or(self.defaults().pool_size)
    }

    pub fn max_overflow(&self) -> u32 {
        self.pool.max_overflow.unwrap_or(self.defaults().max_overflow)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.timeout_secs.unwrap_or(self.defaults().pool_timeout_secs))
    }

    pub fn pool_recycle(&self) -> Duration {
        Duration::from_secs(self.pool.recycle_secs.unwrap_or(self.defaults().pool_recycle_secs))
    }

    pub fn connection_retry(&self) -> RetryLimits {
        limits(
            self.defaults().connection,
            self.retry.connection_attempts,
            self.retry.connection_max_wait_secs,
        )
    }

    pub fn query_retry(&self) -> RetryLimits {
        limits(
            self.defaults().query,
            self.retry.query_attempts,
            self.retry.query_max_wait_secs,
        )
    }

    pub fn reconnect_retry(&self) -> RetryLimits {
        limits(
            self.defaults().reconnect,
            self.retry.reconnect_attempts,
            self.retry.reconnect_max_wait_secs,
        )
    }

    pub fn jitter_factor(&self) -> f64 {
        self.retry.jitter_factor.unwrap_or(self.defaults().jitter_factor)
    }

    pub fn circuit_breaker_failure_threshold(&self) -> u32 {
        self.circuit_breaker
            .failure_threshold
            .unwrap_or(self.defaults().failure_threshold)
    }

    pub fn circuit_breaker_recovery_time(&self) -> Duration {
        Duration::from_secs(
            self.circuit_breaker
                .recovery_time_secs
                .unwrap_or(self.defaults().recovery_time_secs),
        )
    }

    /// Resolved log format: explicit value, else json in production.
    pub fn log_format(&self) -> LogFormat {
        match self.observability.log_format.as_deref().map(str::parse) {
            Some(Ok(format)) => format,
            _ if self.environment == Environment::Production => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    /// Connection string: `connection.uri` if set, otherwise assembled from
    /// the components with credentials escaped.
    pub fn database_uri(&self) -> Result<Url, ConfigError> {
        let conn = &self.connection;
        if let Some(uri) = &conn.uri {
            return Url::parse(uri).map_err(|e| ConfigError::InvalidUri(e.to_string()));
        }

        let mut url = Url::parse(&format!("postgres://{}:{}", conn.host, conn.port))
            .map_err(|e| ConfigError::InvalidUri(format!("host '{}': {e}", conn.host)))?;
        url.set_path(&conn.database);
        url.set_username(&conn.user)
            .map_err(|_| ConfigError::InvalidUri(format!("user '{}'", conn.user)))?;
        if !conn.password.is_empty() {
            url.set_password(Some(&conn.password))
                .map_err(|_| ConfigError::InvalidUri("password".to_string()))?;
        }
        Ok(url)
    }

    /// Connection string safe to log.
    pub fn redacted_uri(&self) -> String {
        match self.database_uri() {
            Ok(url) => redact(url.as_str()),
            Err(_) => "<invalid uri>".to_string(),
        }
    }
}

fn limits(default: RetryLimits, attempts: Option<u32>, max_wait_secs: Option<u64>) -> RetryLimits {
    RetryLimits {
        attempts: attempts.unwrap_or(default.attempts),
        max_wait: max_wait_secs.map(Duration::from_secs).unwrap_or(default.max_wait),
    }
}

/// Replace the password of a connection string with `***`.
pub fn redact(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<invalid uri>".to_string(),
    }
}
