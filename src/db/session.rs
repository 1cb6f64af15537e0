//! Session: one checked-out connection owned by one caller.
//!
//! A session is released exactly once, either through
//! [`ConnectionManager::release_session`](crate::db::ConnectionManager::release_session)
//! or when it is dropped. Dropping covers early returns, panics and
//! cancellation of the task holding it.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::db::engine::Engine;
use crate::db::manager::Inner;
use crate::error::{DbError, DbResult};
use crate::resilience::classify::Classify;

#[derive(Debug, Clone, Copy)]
enum Control {
    Begin,
    Commit,
    Rollback,
}

impl Control {
    fn name(self) -> &'static str {
        match self {
            Control::Begin => "begin",
            Control::Commit => "commit",
            Control::Rollback => "rollback",
        }
    }
}

pub struct Session<E: Engine> {
    id: Uuid,
    acquired_at: Instant,
    conn: Option<E::Connection>,
    inner: Arc<Inner<E>>,
}

impl<E: Engine> Session<E> {
    pub(crate) fn new(conn: E::Connection, inner: Arc<Inner<E>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            acquired_at: Instant::now(),
            conn: Some(conn),
            inner,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// The underlying connection, for running statements.
    pub fn connection_mut(&mut self) -> DbResult<&mut E::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Unexpected(format!("session {} already released", self.id).into()))
    }

    pub async fn begin(&mut self) -> DbResult<()> {
        self.control(Control::Begin).await
    }

    /// Commit under the integrity policy: a failed commit has an unknown
    /// outcome and is never retried.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.control(Control::Commit).await
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        self.control(Control::Rollback).await
    }

    async fn control(&mut self, op: Control) -> DbResult<()> {
        let inner = Arc::clone(&self.inner);
        let session_id = self.id;
        let conn = self.connection_mut()?;
        let mut retry = inner.policies.integrity.start();

        loop {
            let result = match op {
                Control::Begin => inner.engine.begin(conn).await,
                Control::Commit => inner.engine.commit(conn).await,
                Control::Rollback => inner.engine.rollback(conn).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let class = e.classify();
                    tracing::warn!(
                        session_id = %session_id,
                        operation = op.name(),
                        error_class = %class,
                        error = %e,
                        "Transaction control statement failed"
                    );
                    inner.record_statement_failure(class);
                    retry.backoff_or_fail_classified(class, e).await?;
                }
            }
        }
    }

    pub(crate) fn release(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.inner.release_connection(self.id, conn);
        }
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<E: Engine> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("released", &self.conn.is_none())
            .finish()
    }
}
