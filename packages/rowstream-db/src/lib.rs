//! Scoped SQLite connections and lazy row streaming.
//! Used by the rowstream CLI and by library callers that need bounded-memory reads.

pub mod batch;
pub mod config;
pub mod error;
pub mod infra;
pub mod row;
pub mod stream;
pub mod users;

pub use batch::{load_records, matching_rows, stream_file_in_batches, stream_in_batches, Batch, Batches};
pub use config::db::{ConnectionSettings, DbKind};
pub use error::StoreError;
pub use infra::db::diagnostics::connection_counters;
pub use infra::db::scope::{execute_query, with_connection, ScopedConnection};
pub use row::Row;
pub use sea_orm::Value;
pub use stream::{stream, RowStream};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_support::logging::init();
}
