//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the Postgres engine from validated configuration
//! - Construct the one process-wide connection manager
//! - Establish connectivity under the connection retry policy
//!
//! # Design Decisions
//! - Fail fast: an initialization error is returned, not swallowed
//! - Logging and metrics are installed by the binary before this runs

use crate::config::{ConfigError, DatabaseConfig};
use crate::db::{ConnectionManager, PgEngine};
use crate::error::DbError;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Build and initialize the manager for `config`.
pub async fn start(config: DatabaseConfig) -> Result<ConnectionManager<PgEngine>, StartupError> {
    let engine = PgEngine::from_config(&config)?;
    let manager = ConnectionManager::new(engine, config);
    manager.initialize().await?;
    Ok(manager)
}
