//! Transaction scoping on a session.

use futures_util::future::BoxFuture;

use crate::db::engine::Engine;
use crate::db::session::Session;
use crate::error::DbResult;

/// Run `body` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// A failed rollback is logged and the body's error is returned. If the
/// future is dropped mid-transaction the session is released with the
/// transaction still open; the pool resets the connection before reuse.
pub async fn in_transaction<E, T, F>(session: &mut Session<E>, body: F) -> DbResult<T>
where
    E: Engine,
    F: for<'s> FnOnce(&'s mut Session<E>) -> BoxFuture<'s, DbResult<T>>,
{
    session.begin().await?;

    match body(session).await {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = session.rollback().await {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %rollback,
                    "Rollback failed"
                );
            }
            Err(e)
        }
    }
}
