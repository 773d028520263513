//! Helpers for the `user_data(user_id, name, email, age)` table.

use tracing::info;

use crate::config::db::ConnectionSettings;
use crate::error::StoreError;
use crate::row::Row;
use crate::stream::{stream, RowStream};

pub const USER_TABLE: &str = "user_data";
pub const AGE_COLUMN: &str = "age";

/// Every user row, in engine order.
pub async fn stream_users(settings: &ConnectionSettings) -> Result<RowStream, StoreError> {
    stream(settings, format!("SELECT * FROM {USER_TABLE}"), []).await
}

/// Only the `age` column of every user.
pub async fn stream_user_ages(settings: &ConnectionSettings) -> Result<RowStream, StoreError> {
    stream(settings, format!("SELECT {AGE_COLUMN} FROM {USER_TABLE}"), []).await
}

/// Single-pass mean of `column` over `rows`; `None` when there are no rows.
///
/// Null values are skipped. The stream is consumed and closed.
pub async fn column_average(mut rows: RowStream, column: &str) -> Result<Option<f64>, StoreError> {
    let mut total = 0.0;
    let mut count: u64 = 0;

    while let Some(row) = rows.next().await {
        let value = match row.and_then(|r| r.get_f64(column)) {
            Ok(value) => value,
            Err(e) => {
                rows.close().await;
                return Err(e);
            }
        };
        if let Some(v) = value {
            total += v;
            count += 1;
        }
    }
    rows.close().await;

    if count == 0 {
        Ok(None)
    } else {
        Ok(Some(total / count as f64))
    }
}

pub async fn average_user_age(settings: &ConnectionSettings) -> Result<Option<f64>, StoreError> {
    let average = column_average(stream_user_ages(settings).await?, AGE_COLUMN).await?;
    info!(average = ?average, "users=average_age");
    Ok(average)
}

/// Predicate for [`crate::batch::matching_rows`]: `age` strictly above `threshold`.
/// Missing or unreadable ages count as 0.
pub fn older_than(threshold: f64) -> impl Fn(&Row) -> bool {
    move |row| row.get_f64(AGE_COLUMN).ok().flatten().unwrap_or(0.0) > threshold
}
