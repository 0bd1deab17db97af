use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::Key;
use diesel::{
    SqliteConnection,
    connection::{SimpleConnection, TransactionManager},
    r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection},
};
use tokio::sync::broadcast::Sender;

use crate::{
    config::Settings,
    msg::{HeldMessages, Msg},
};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

type SharedConn = Arc<tokio::sync::Mutex<PooledConn>>;

const DB_UNAVAILABLE: (StatusCode, &str) =
    (StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");

/// Everything the request handlers need access to.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub key: Key,
    pub tx: Sender<Msg>,
    pub settings: Arc<Settings>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl FromRef<AppState> for Sender<Msg> {
    fn from_ref(state: &AppState) -> Self {
        state.tx.clone()
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}

/// SQLite only enforces foreign keys when asked to, per connection.
#[derive(Debug)]
pub struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for SqlitePragmas
{
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn make_pool(db_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    Pool::builder()
        .max_size(if db_url == ":memory:" { 1 } else { 10 })
        .connection_customizer(Box::new(SqlitePragmas))
        .build(ConnectionManager::<SqliteConnection>::new(db_url))
}

/// Slot through which a transactional connection opened while handling a
/// request is handed back to [`commit_transactions`].
#[derive(Clone, Default)]
struct OpenTransaction(Arc<std::sync::Mutex<Option<SharedConn>>>);

/// This middleware commits opened transactions after each request has been
/// handled (or rolls them back, if the handler did not succeed). Messages
/// published through an [`crate::msg::Outbox`] are only sent once the changes they
/// describe have been committed.
pub async fn commit_transactions(
    State(tx): State<Sender<Msg>>,
    mut req: Request,
    next: Next,
) -> Response {
    let open = OpenTransaction::default();
    let held = HeldMessages::default();
    req.extensions_mut().insert(open.clone());
    req.extensions_mut().insert(held.clone());

    let res = next.run(req).await;
    let status = res.status();
    let succeeded = status.is_success()
        || status.is_redirection()
        || status.is_informational();

    let conn = match open.0.lock() {
        Ok(mut slot) => slot.take(),
        Err(_) => None,
    };

    if let Some(conn) = conn {
        let mut conn = conn.lock().await;

        let outcome = if succeeded {
            <PooledConn as diesel::Connection>::TransactionManager::commit_transaction(
                &mut *conn,
            )
        } else {
            tracing::debug!("rolling back transaction (status = {status})");
            <PooledConn as diesel::Connection>::TransactionManager::rollback_transaction(
                &mut *conn,
            )
        };

        if let Err(e) = outcome {
            tracing::error!("failed to finish transaction: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if succeeded {
        held.release(&tx);
    }

    res
}

pub struct Conn<const TX: bool> {
    inner: tokio::sync::OwnedMutexGuard<PooledConn>,
}

impl<const TX: bool> Deref for Conn<TX> {
    type Target = PooledConn;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl<const TX: bool> DerefMut for Conn<TX> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.deref_mut()
    }
}

#[async_trait]
impl<const TX: bool, S> FromRequestParts<S> for Conn<TX>
where
    S: Send + Sync,
    DbPool: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let conn = ThreadSafeConn::<TX>::from_request_parts(parts, state).await?;

        match conn.inner.try_lock_owned() {
            Ok(inner) => Ok(Conn { inner }),
            Err(_) => Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database connection already in use",
            )),
        }
    }
}

/// A connection which is shared between all the extractors of a single
/// request. When `TX` is true, a transaction is opened when the connection is
/// first requested.
#[derive(Clone)]
pub struct ThreadSafeConn<const TX: bool> {
    pub inner: SharedConn,
}

#[async_trait]
impl<const TX: bool, S> FromRequestParts<S> for ThreadSafeConn<TX>
where
    S: Send + Sync,
    DbPool: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        if let Some(conn) = parts.extensions.get::<ThreadSafeConn<TX>>() {
            return Ok(conn.clone());
        }

        let pool = DbPool::from_ref(state);
        let mut conn = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|_| DB_UNAVAILABLE)?
            .map_err(|e| {
                tracing::error!("could not check out a connection: {e}");
                DB_UNAVAILABLE
            })?;

        let open = if TX {
            let open = parts
                .extensions
                .get::<OpenTransaction>()
                .cloned()
                .ok_or_else(|| {
                    tracing::error!(
                        "transactional connection requested without the commit middleware"
                    );
                    DB_UNAVAILABLE
                })?;

            <PooledConn as diesel::Connection>::TransactionManager::begin_transaction(
                &mut conn,
            )
            .map_err(|e| {
                tracing::error!("could not begin transaction: {e}");
                DB_UNAVAILABLE
            })?;

            Some(open)
        } else {
            None
        };

        let inner = Arc::new(tokio::sync::Mutex::new(conn));

        if let Some(open) = open {
            match open.0.lock() {
                Ok(mut slot) => *slot = Some(inner.clone()),
                Err(_) => return Err(DB_UNAVAILABLE),
            }
        }

        let conn = ThreadSafeConn { inner };
        parts.extensions.insert(conn.clone());
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, middleware, routing::post};
    use axum_test::TestServer;
    use tokio::sync::broadcast;

    use super::commit_transactions;
    use crate::msg::{Outbox, tests::msg};

    async fn publish_then_succeed(outbox: Outbox) -> StatusCode {
        outbox.publish(msg("kept"));
        StatusCode::OK
    }

    async fn publish_then_fail(outbox: Outbox) -> StatusCode {
        outbox.publish(msg("dropped"));
        StatusCode::BAD_REQUEST
    }

    #[tokio::test]
    async fn messages_are_only_sent_for_successful_requests() {
        let (tx, mut rx) = broadcast::channel(16);
        let app = Router::new()
            .route("/ok", post(publish_then_succeed))
            .route("/fail", post(publish_then_fail))
            .layer(middleware::from_fn_with_state(
                tx.clone(),
                commit_transactions,
            ))
            .with_state(tx.clone());
        let server = TestServer::new(app).unwrap();

        server.post("/fail").await.assert_status(StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());

        server.post("/ok").await.assert_status_ok();
        let sent = rx.try_recv().unwrap();
        let crate::msg::MsgContents::Notification(n) = sent.inner;
        assert_eq!(n.title, "kept");
        assert!(rx.try_recv().is_err());
    }
}
