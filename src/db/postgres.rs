//! Postgres engine over a lazily connected sqlx pool.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;

use crate::config::{ConfigError, DatabaseConfig};
use crate::db::engine::Engine;

/// [`Engine`] backed by a sqlx `PgPool`.
#[derive(Debug, Clone)]
pub struct PgEngine {
    pool: PgPool,
}

impl PgEngine {
    /// Build the pool from configuration without connecting.
    ///
    /// Sizing: `pool_size` connections kept, up to `pool_size + max_overflow`
    /// under load. Checkout waits at most `pool_timeout`; connections are
    /// recycled after `pool_recycle`; `pre_ping` tests a connection before
    /// handing it out. Must be called inside a tokio runtime.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        let uri = config.database_uri()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size().saturating_add(config.max_overflow()))
            .min_connections(config.pool_size())
            .acquire_timeout(config.pool_timeout())
            .max_lifetime(config.pool_recycle())
            .test_before_acquire(config.pool.pre_ping)
            .connect_lazy(uri.as_str())
            .map_err(|e| ConfigError::InvalidUri(e.to_string()))?;

        tracing::debug!(
            uri = %config.redacted_uri(),
            pool_size = config.pool_size(),
            max_overflow = config.max_overflow(),
            "Postgres pool configured"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Engine for PgEngine {
    type Connection = PoolConnection<Postgres>;
    type Error = sqlx::Error;

    async fn checkout(&self) -> Result<Self::Connection, Self::Error> {
        self.pool.acquire().await
    }

    async fn ping(&self, conn: &mut Self::Connection) -> Result<i64, Self::Error> {
        let value: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&mut **conn).await?;
        Ok(i64::from(value))
    }

    fn release(&self, conn: Self::Connection) -> Result<(), Self::Error> {
        // returned to the pool on drop
        drop(conn);
        Ok(())
    }

    async fn begin(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        sqlx::query("BEGIN").execute(&mut **conn).await.map(|_| ())
    }

    async fn commit(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        sqlx::query("COMMIT").execute(&mut **conn).await.map(|_| ())
    }

    async fn rollback(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        sqlx::query("ROLLBACK").execute(&mut **conn).await.map(|_| ())
    }

    async fn dispose(&self) {
        self.pool.close().await;
    }
}
