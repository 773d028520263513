//! Test support utilities
//!
//! Unified test logging initialization plus throwaway SQLite stores with a
//! `user_data` table for integration tests.

pub mod fixtures;
pub mod logging;

pub use fixtures::{sample_users, unique_email, write_records_file, TempStore, UserFixture};
