// Standard library imports
use std::str::FromStr;
use std::time::Duration;

// External crate imports
use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, trace, warn};

// Internal crate imports
use crate::config::db::{ConnectionSettings, DbKind};
use crate::error::StoreError;
use crate::infra::db::diagnostics::connection_counters;

fn get_db_engine(db_kind: DbKind) -> &'static str {
    match db_kind {
        DbKind::SqliteFile => "sqlite-file",
        DbKind::SqliteMemory => "sqlite-memory",
    }
}

fn connect_options(settings: &ConnectionSettings) -> Result<SqliteConnectOptions, StoreError> {
    let opts = match settings.kind {
        DbKind::SqliteFile => SqliteConnectOptions::new().filename(&settings.file),
        DbKind::SqliteMemory => SqliteConnectOptions::from_str(&settings.conn_spec())
            .map_err(|e| StoreError::config(format!("invalid SQLite connection options: {e}")))?,
    };
    Ok(opts.create_if_missing(settings.create_if_missing))
}

/// Apply per-connection PRAGMAs built from the settings.
async fn apply_session_statements(
    conn: &mut sqlx::SqliteConnection,
    statements: &[String],
) -> Result<(), sqlx::Error> {
    for stmt in statements {
        sqlx::query(stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Open a single-session handle to the configured store.
///
/// The underlying sqlx pool is pinned to min=max=1 so the handle is one physical
/// SQLite connection; it is opened eagerly, so an unreachable store fails here
/// before any statement runs. Nothing is retried.
pub async fn open_connection(
    settings: &ConnectionSettings,
) -> Result<DatabaseConnection, StoreError> {
    settings.validate()?;
    let connect_opts = connect_options(settings)?;
    let statements = settings.session_statements();

    let pool: SqlitePool = match SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms))
        .idle_timeout(None)
        .max_lifetime(None)
        .after_connect(move |conn, _meta| {
            let statements = statements.clone();
            Box::pin(async move {
                apply_session_statements(conn, &statements).await?;
                trace!("db=sqlite hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_with(connect_opts)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            connection_counters::open_failed();
            warn!(
                engine = get_db_engine(settings.kind),
                path = %settings.describe(),
                error = %e,
                "connection=open_failed"
            );
            return Err(StoreError::connection(format!(
                "failed to open {}: {e}",
                settings.describe()
            )));
        }
    };

    connection_counters::opened();
    info!(
        "connection=open engine={} path={} busy_timeout_ms={}",
        get_db_engine(settings.kind),
        settings.describe(),
        settings.busy_timeout_ms
    );

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}
