pub mod core;
pub mod diagnostics;
pub mod scope;

pub use core::open_connection;
pub use diagnostics::connection_counters;
pub use scope::{execute_query, with_connection, ScopedConnection};
