use std::path::PathBuf;

use sea_orm::DbErr;
use thiserror::Error;
use tracing::warn;

use crate::infra::db::diagnostics::connection_counters;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {detail}")]
    Connection { detail: String },
    #[error("Query error: {detail}")]
    Query { detail: String },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("Invalid batch size: {size} (must be greater than zero)")]
    InvalidBatchSize { size: usize },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Decode error: {detail}")]
    Decode { detail: String },
}

impl StoreError {
    pub fn connection(detail: impl Into<String>) -> Self {
        Self::Connection {
            detail: detail.into(),
        }
    }

    pub fn query(detail: impl Into<String>) -> Self {
        Self::Query {
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            detail: detail.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}

/// Messages sqlx/sea-orm produce when a handle is used after its pool was closed.
fn mentions_closed_pool(msg: &str) -> bool {
    msg.contains("PoolClosed")
        || msg.contains("pool has been closed")
        || msg.contains("attempted to acquire a connection on a closed pool")
}

/// Classify a `DbErr` into the connection/query taxonomy.
pub fn map_db_err(e: DbErr) -> StoreError {
    let error_msg = e.to_string();

    match &e {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
            warn!(error = %error_msg, "Database unavailable");
            return StoreError::connection(error_msg);
        }
        _ => {}
    }

    if mentions_closed_pool(&error_msg) {
        warn!(error = %error_msg, "Database handle already closed");
        return StoreError::connection(error_msg);
    }

    connection_counters::query_failed();
    warn!(error = %error_msg, "Query failed");
    StoreError::query(error_msg)
}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        map_db_err(e)
    }
}
