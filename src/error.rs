//! Error taxonomy surfaced by the connection layer.
//!
//! Every failure that leaves this crate is one of four kinds:
//!
//! | Variant          | Meaning for the caller                    | Code                   |
//! |------------------|-------------------------------------------|------------------------|
//! | `CircuitOpen`    | try later, no attempt was made            | `CIRCUIT_OPEN`         |
//! | `RetryExhausted` | database is down                          | `DATABASE_UNAVAILABLE` |
//! | `Integrity`      | the statement violated a constraint       | `INTEGRITY_VIOLATION`  |
//! | `Unexpected`     | unclassified, surface upward unchanged    | `INTERNAL_ERROR`       |

use std::time::Duration;

use thiserror::Error;

use crate::resilience::classify::ErrorClass;

/// Boxed underlying cause, preserved for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for connection-layer operations.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// The breaker is open; the database was not contacted.
    #[error("circuit breaker open after {failures} consecutive failures, retry in {retry_after:?}")]
    CircuitOpen { failures: u32, retry_after: Duration },

    /// Every permitted attempt failed with a transient error.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// Constraint violation. Never retried.
    #[error("integrity violation: {0}")]
    Integrity(#[source] BoxError),

    /// Anything that could not be classified as transient or integrity.
    #[error("unexpected database error: {0}")]
    Unexpected(#[source] BoxError),
}

impl DbError {
    /// Wrap a classified failure that will not be retried.
    pub(crate) fn terminal(class: ErrorClass, operation: &'static str, source: BoxError) -> Self {
        match class {
            ErrorClass::Integrity => Self::Integrity(source),
            // callers route transient failures through `retries::exhausted`
            ErrorClass::Transient => Self::RetryExhausted {
                operation,
                attempts: 1,
                source,
            },
            ErrorClass::Unexpected => Self::Unexpected(source),
        }
    }

    /// Stable code for callers mapping errors onto their own responses.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::RetryExhausted { .. } => "DATABASE_UNAVAILABLE",
            Self::Integrity(_) => "INTEGRITY_VIOLATION",
            Self::Unexpected(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether backing off and trying again later can succeed.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::RetryExhausted { .. })
    }

    /// The classification this error was surfaced under.
    ///
    /// `CircuitOpen` and `RetryExhausted` both describe an unreachable
    /// database and report as transient.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::CircuitOpen { .. } | Self::RetryExhausted { .. } => ErrorClass::Transient,
            Self::Integrity(_) => ErrorClass::Integrity,
            Self::Unexpected(_) => ErrorClass::Unexpected,
        }
    }
}
