use std::future::Future;

use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement, Value};
use tracing::{debug, info, warn};

use crate::config::db::ConnectionSettings;
use crate::error::{map_db_err, StoreError};
use crate::infra::db::core::open_connection;
use crate::infra::db::diagnostics::connection_counters;
use crate::row::Row;

/// Build a positional-parameter SQLite statement.
pub(crate) fn sqlite_statement(query: &str, params: impl IntoIterator<Item = Value>) -> Statement {
    Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        query,
        params.into_iter().collect::<Vec<_>>(),
    )
}

/// An open database handle owned by one scope.
///
/// The handle is released exactly once: by [`ScopedConnection::release`] on the
/// normal path, or by `Drop` when the scope is left any other way (early return,
/// `?`, panic unwinding, an abandoned stream).
pub struct ScopedConnection {
    conn: DatabaseConnection,
    target: String,
    released: bool,
}

impl ScopedConnection {
    /// Open a fresh handle to the configured store.
    pub async fn acquire(settings: &ConnectionSettings) -> Result<Self, StoreError> {
        let conn = open_connection(settings).await?;
        Ok(Self {
            conn,
            target: settings.describe(),
            released: false,
        })
    }

    pub fn handle(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run a query on this handle and collect every row.
    pub async fn fetch_all(
        &self,
        query: &str,
        params: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Row>, StoreError> {
        let results = self
            .conn
            .query_all(sqlite_statement(query, params))
            .await
            .map_err(map_db_err)?;
        results.iter().map(Row::from_query_result).collect()
    }

    /// Run a statement on this handle, returning the number of affected rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: impl IntoIterator<Item = Value>,
    ) -> Result<u64, StoreError> {
        let result = self
            .conn
            .execute(sqlite_statement(sql, params))
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }

    /// Close the handle. Close failures are reported but the handle is gone either way.
    pub async fn release(mut self) -> Result<(), StoreError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        connection_counters::closed();

        let conn = std::mem::replace(&mut self.conn, DatabaseConnection::Disconnected);
        match conn.close().await {
            Ok(()) => {
                info!("connection=close path={}", self.target);
                Ok(())
            }
            Err(e) => {
                connection_counters::close_failed();
                warn!(error = %e, path = %self.target, "Failed to close connection");
                Err(StoreError::connection(format!(
                    "failed to close {}: {e}",
                    self.target
                )))
            }
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        connection_counters::closed();
        debug!(path = %self.target, "connection=close reason=scope_exit");

        let conn = std::mem::replace(&mut self.conn, DatabaseConnection::Disconnected);
        let target = std::mem::take(&mut self.target);
        // Without a runtime the pool handle is simply dropped, which closes the session.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    connection_counters::close_failed();
                    warn!(error = %e, path = %target, "Failed to close dropped connection");
                }
            });
        }
    }
}

/// Execute a function with a freshly opened connection.
///
/// The closure receives a clone of the handle; the handle is closed after the closure
/// finishes, whether it returned `Ok`, `Err` or panicked. Clones kept past this call
/// fail with a connection error.
pub async fn with_connection<R, F, Fut>(settings: &ConnectionSettings, f: F) -> Result<R, StoreError>
where
    F: FnOnce(DatabaseConnection) -> Fut,
    Fut: Future<Output = Result<R, StoreError>>,
{
    let scope = ScopedConnection::acquire(settings).await?;
    let out = f(scope.handle().clone()).await;

    // Best-effort close; the closure's outcome wins
    if let Err(release_err) = scope.release().await {
        warn!(error = %release_err, "Failed to release scoped connection");
    }
    out
}

/// Open a connection, run `query` with `params`, fetch every row and close.
pub async fn execute_query(
    settings: &ConnectionSettings,
    query: &str,
    params: impl IntoIterator<Item = Value>,
) -> Result<Vec<Row>, StoreError> {
    let stmt = sqlite_statement(query, params);
    with_connection(settings, |conn| async move {
        let results = conn.query_all(stmt).await.map_err(map_db_err)?;
        results.iter().map(Row::from_query_result).collect()
    })
    .await
}
