//! Throwaway SQLite stores for tests.

use std::path::{Path, PathBuf};

use rowstream_db::{ConnectionSettings, ScopedConnection, StoreError, Value};
use tempfile::TempDir;
use ulid::Ulid;

const CREATE_USER_TABLE: &str = "CREATE TABLE IF NOT EXISTS user_data (
    user_id VARCHAR(36) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    age DECIMAL NOT NULL
)";

/// Generate a unique email address in the format `{prefix}-{ulid}@example.test`
pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.test", prefix, Ulid::new()).to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserFixture {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub age: i64,
}

impl UserFixture {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            user_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: unique_email(&name.to_lowercase()),
            age,
        }
    }
}

/// A SQLite file in its own temp directory; removed on drop.
pub struct TempStore {
    dir: TempDir,
    pub settings: ConnectionSettings,
}

impl TempStore {
    /// An empty store file (created on first connect).
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("Should create temp dir");
        let settings = ConnectionSettings::sqlite_file(dir.path().join("users.db"));
        Self { dir, settings }
    }

    /// A store with a `user_data` table holding `users`.
    pub async fn with_users(users: &[UserFixture]) -> Result<Self, StoreError> {
        let store = Self::empty();
        let scope = ScopedConnection::acquire(&store.settings).await?;
        scope.execute(CREATE_USER_TABLE, []).await?;
        for user in users {
            scope
                .execute(
                    "INSERT INTO user_data (user_id, name, email, age) VALUES (?, ?, ?, ?)",
                    vec![
                        Value::from(user.user_id.clone()),
                        Value::from(user.name.clone()),
                        Value::from(user.email.clone()),
                        Value::from(user.age),
                    ],
                )
                .await?;
        }
        scope.release().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Settings pointing somewhere that cannot be opened.
    pub fn unreachable(&self) -> ConnectionSettings {
        ConnectionSettings::sqlite_file(self.dir.path().join("no/such/dir/users.db"))
    }
}

/// Ages 20, 23, 26, ... with predictable names.
pub fn sample_users(count: usize) -> Vec<UserFixture> {
    (0..count)
        .map(|i| UserFixture::new(&format!("User{i}"), 20 + 3 * i as i64))
        .collect()
}

/// Write `records` (a JSON value, usually an array) to `<dir>/<name>`.
pub fn write_records_file(dir: &Path, name: &str, records: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    let text = serde_json::to_string_pretty(records).expect("records should serialize");
    std::fs::write(&path, text).expect("Should write records file");
    path
}
