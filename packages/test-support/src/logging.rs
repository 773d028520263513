//! Tracing setup shared by the rowstream test binaries.
//!
//! `rowstream-db` installs it from a `ctor` hook for its unit tests and from
//! `tests/common` for each integration binary, so connection open/close and
//! stream lifecycle events show up with `TEST_LOG=rowstream_db=debug`.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Initialize structured logging for tests.
///
/// Idempotent and race-safe. The level comes from `TEST_LOG`, then `RUST_LOG`,
/// then defaults to `"warn"`.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter = std::env::var("TEST_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .try_init()
            .ok();
    });
}
