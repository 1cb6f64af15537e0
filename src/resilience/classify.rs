//! Failure classification.
//!
//! Every failed database interaction is classified exactly once and the
//! caller branches on the result:
//!
//! ```text
//! Transient  → retry under the active policy
//! Integrity  → surface immediately, never retried
//! Unexpected → surface immediately, logged for operator attention
//! ```

use std::fmt;

use serde::Serialize;

/// Failure class of a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connectivity or operational failure expected to clear on its own.
    Transient,
    /// Constraint violation; retrying cannot help.
    Integrity,
    /// Everything else.
    Unexpected,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Integrity => "integrity",
            ErrorClass::Unexpected => "unexpected",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that know their own failure class.
pub trait Classify {
    fn classify(&self) -> ErrorClass;
}

/// Classify a Postgres SQLSTATE code.
///
/// Class 23 is integrity constraint violation. Class 08 (connection
/// exception), 53 (insufficient resources), 57P01..57P03 (server shutting
/// down or not accepting connections), 40001 (serialization failure) and
/// 40P01 (deadlock) clear on retry.
pub fn classify_sqlstate(code: &str) -> ErrorClass {
    if code.starts_with("23") {
        return ErrorClass::Integrity;
    }
    if code.starts_with("08") || code.starts_with("53") || code.starts_with("57P") {
        return ErrorClass::Transient;
    }
    match code {
        "40001" | "40P01" => ErrorClass::Transient,
        _ => ErrorClass::Unexpected,
    }
}

impl Classify for sqlx::Error {
    fn classify(&self) -> ErrorClass {
        use sqlx::error::ErrorKind;

        match self {
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => ErrorClass::Integrity,
                _ => db
                    .code()
                    .map(|code| classify_sqlstate(&code))
                    .unwrap_or(ErrorClass::Unexpected),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => ErrorClass::Transient,
            // a closed pool never heals on its own
            _ => ErrorClass::Unexpected,
        }
    }
}
