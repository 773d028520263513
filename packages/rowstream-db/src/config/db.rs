use std::env;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const DEFAULT_DB_FILE: &str = "users.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 2000;

/// Which kind of SQLite store a connection targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// On-disk database file
    SqliteFile,
    /// Private in-memory database, gone when the connection closes
    SqliteMemory,
}

/// Everything needed to open one scoped connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub kind: DbKind,
    pub file: PathBuf,
    /// Create the database file when it does not exist yet
    pub create_if_missing: bool,
    pub busy_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::sqlite_file(DEFAULT_DB_FILE)
    }
}

impl ConnectionSettings {
    pub fn sqlite_file(path: impl AsRef<Path>) -> Self {
        Self {
            kind: DbKind::SqliteFile,
            file: path.as_ref().to_path_buf(),
            create_if_missing: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            kind: DbKind::SqliteMemory,
            file: PathBuf::new(),
            create_if_missing: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Build settings from `ROWSTREAM_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, StoreError> {
        let kind = db_kind()?;
        let mut settings = match kind {
            DbKind::SqliteFile => Self::sqlite_file(db_file()),
            DbKind::SqliteMemory => Self::in_memory(),
        };
        settings.busy_timeout_ms = u64_var("ROWSTREAM_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;
        settings.acquire_timeout_ms =
            u64_var("ROWSTREAM_ACQUIRE_TIMEOUT_MS", DEFAULT_ACQUIRE_TIMEOUT_MS)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.kind == DbKind::SqliteFile && self.file.as_os_str().is_empty() {
            return Err(StoreError::config("SQLite file path must not be empty"));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(StoreError::config(
                "acquire timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// SQLite connection URL for these settings.
    pub fn conn_spec(&self) -> String {
        match self.kind {
            DbKind::SqliteFile => format!("sqlite:{}", self.file.display()),
            DbKind::SqliteMemory => "sqlite::memory:".to_string(),
        }
    }

    /// Per-connection statements run right after the session opens.
    pub fn session_statements(&self) -> Vec<String> {
        vec![
            "PRAGMA foreign_keys = ON;".to_string(),
            format!("PRAGMA busy_timeout = {};", self.busy_timeout_ms),
        ]
    }

    /// Human-readable target for logs.
    pub fn describe(&self) -> String {
        match self.kind {
            DbKind::SqliteFile => self.file.display().to_string(),
            DbKind::SqliteMemory => "sqlite::memory:".to_string(),
        }
    }
}

/// Get database kind from environment (defaults to file)
fn db_kind() -> Result<DbKind, StoreError> {
    match env::var("ROWSTREAM_DB_KIND") {
        Err(_) => Ok(DbKind::SqliteFile),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" | "file" | "sqlite-file" => Ok(DbKind::SqliteFile),
            "memory" | "sqlite-memory" => Ok(DbKind::SqliteMemory),
            other => Err(StoreError::config(format!(
                "ROWSTREAM_DB_KIND must be 'file' or 'memory', but got: '{other}'"
            ))),
        },
    }
}

/// Get database file from environment (defaults to users.db)
fn db_file() -> PathBuf {
    env::var("ROWSTREAM_DB_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_FILE))
}

fn u64_var(name: &str, default: u64) -> Result<u64, StoreError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
            StoreError::config(format!(
                "Environment variable '{name}' must be a non-negative integer, but got: '{raw}'"
            ))
        }),
    }
}
