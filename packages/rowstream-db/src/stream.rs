//! Lazy, single-pass row streaming over a scoped connection.
//!
//! A producer task owns the [`ScopedConnection`] and the engine cursor. It is driven
//! strictly by demand: each [`RowStream::next`] call hands it one reply slot, and it
//! fetches at most one row per slot. The query itself is issued on the first pull.
//! When the consumer is done (exhaustion, error, `close`, or drop) the producer drops
//! the cursor and releases the connection.

use futures::{Stream, StreamExt};
use sea_orm::{DatabaseConnection, Statement, StreamTrait, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::db::ConnectionSettings;
use crate::error::{map_db_err, StoreError};
use crate::infra::db::scope::{sqlite_statement, ScopedConnection};
use crate::row::Row;

type Reply = oneshot::Sender<Option<Result<Row, StoreError>>>;

/// Open a connection and lazily stream the rows of `query`.
///
/// Connection failures surface from this call. Query failures surface from the first
/// pull that hits them and end the sequence. Rows come back in engine order; add an
/// `ORDER BY` when the order matters.
pub async fn stream(
    settings: &ConnectionSettings,
    query: impl Into<String>,
    params: impl IntoIterator<Item = Value>,
) -> Result<RowStream, StoreError> {
    let query = query.into();
    let stmt = sqlite_statement(&query, params);
    let scope = ScopedConnection::acquire(settings).await?;

    let (requests, pending) = mpsc::channel::<Reply>(1);
    debug!(path = %scope.target(), "stream=open");
    let worker = tokio::spawn(produce(scope, stmt, pending));

    Ok(RowStream {
        requests: Some(requests),
        worker: Some(worker),
        awaiting_reply: false,
        finished: false,
    })
}

async fn produce(scope: ScopedConnection, stmt: Statement, mut pending: mpsc::Receiver<Reply>) {
    let served = pump(scope.handle(), stmt, &mut pending).await;
    drop(pending);
    debug!(rows = served, path = %scope.target(), "stream=done");

    if let Err(release_err) = scope.release().await {
        warn!(error = %release_err, "Failed to release streaming connection");
    }
}

/// Serve reply slots until the rows run out, a failure occurs, or the consumer leaves.
async fn pump(
    conn: &DatabaseConnection,
    stmt: Statement,
    pending: &mut mpsc::Receiver<Reply>,
) -> usize {
    let Some(first) = pending.recv().await else {
        return 0;
    };

    let mut rows = match conn.stream(stmt).await {
        Ok(rows) => Box::pin(rows),
        Err(e) => {
            let _ = first.send(Some(Err(map_db_err(e))));
            return 0;
        }
    };

    let mut served = 0;
    let mut reply = Some(first);
    while let Some(slot) = reply.take() {
        let item = match rows.next().await {
            Some(Ok(result)) => Some(Row::from_query_result(&result)),
            Some(Err(e)) => Some(Err(map_db_err(e))),
            None => None,
        };

        let more = matches!(item, Some(Ok(_)));
        if more {
            served += 1;
        }
        if slot.send(item).is_err() || !more {
            break;
        }
        reply = pending.recv().await;
    }
    served
}

/// Pull-based sequence of rows; see [`stream`].
pub struct RowStream {
    requests: Option<mpsc::Sender<Reply>>,
    worker: Option<JoinHandle<()>>,
    /// Set while a queued pull waits for its row; still set on entry means that pull
    /// was cancelled.
    awaiting_reply: bool,
    finished: bool,
}

impl RowStream {
    /// Fetch the next row. Returns `None` once the sequence has ended; an `Err` item
    /// ends it as well.
    ///
    /// Not cancel-safe: dropping this future after the pull was queued (inside
    /// `select!` or a timeout) abandons the stream and releases the connection. The
    /// following call then returns a `Connection` error rather than `None`.
    pub async fn next(&mut self) -> Option<Result<Row, StoreError>> {
        if self.finished {
            return None;
        }
        if self.awaiting_reply {
            self.finish();
            return Some(Err(StoreError::connection(
                "row stream abandoned by a cancelled pull",
            )));
        }
        let requests = self.requests.as_ref()?;

        let (slot, reply) = oneshot::channel();
        if requests.send(slot).await.is_err() {
            self.finish();
            return None;
        }

        self.awaiting_reply = true;
        let received = reply.await;
        self.awaiting_reply = false;

        match received {
            Ok(Some(Ok(row))) => Some(Ok(row)),
            Ok(Some(Err(e))) => {
                self.finish();
                Some(Err(e))
            }
            Ok(None) | Err(_) => {
                self.finish();
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop iterating and wait until the connection has been released.
    pub async fn close(mut self) {
        self.finish();
        if let Some(worker) = self.worker.take() {
            if let Err(join_err) = worker.await {
                warn!(error = %join_err, "stream producer ended abnormally");
            }
        }
    }

    /// Drain the remaining rows, stopping at the first error.
    pub async fn try_collect(mut self) -> Result<Vec<Row>, StoreError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        self.close().await;
        Ok(rows)
    }

    /// Adapt to a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row, StoreError>> {
        futures::stream::unfold(self, |mut rows| async move {
            rows.next().await.map(|item| (item, rows))
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        self.requests = None;
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;

    use super::*;

    async fn seeded_file() -> (tempfile::TempDir, ConnectionSettings) {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let settings = ConnectionSettings::sqlite_file(dir.path().join("stream.db"));
        let scope = ScopedConnection::acquire(&settings).await.unwrap();
        scope
            .execute("CREATE TABLE n (v INTEGER NOT NULL)", [])
            .await
            .unwrap();
        scope
            .execute("INSERT INTO n (v) VALUES (1), (2), (3)", [])
            .await
            .unwrap();
        scope.release().await.unwrap();
        (dir, settings)
    }

    #[tokio::test]
    async fn test_stream_yields_rows_then_none() {
        let (_dir, settings) = seeded_file().await;
        let mut rows = stream(&settings, "SELECT v FROM n ORDER BY v", [])
            .await
            .unwrap();

        for expected in 1..=3 {
            let row = rows.next().await.unwrap().unwrap();
            assert_eq!(row.get("v"), Some(&json!(expected)));
        }
        assert!(rows.next().await.is_none());
        assert!(rows.is_finished());
        assert!(rows.next().await.is_none());
        rows.close().await;
    }

    #[tokio::test]
    async fn test_stream_binds_params() {
        let (_dir, settings) = seeded_file().await;
        let rows = stream(&settings, "SELECT v FROM n WHERE v > ? ORDER BY v", [Value::from(1_i64)])
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("v"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_query_error_surfaces_on_first_pull() {
        let (_dir, settings) = seeded_file().await;
        let mut rows = stream(&settings, "SELECT v FROM missing_table", [])
            .await
            .unwrap();

        let err = rows.next().await.unwrap().unwrap_err();
        assert!(err.is_query(), "unexpected error: {err}");
        assert!(rows.next().await.is_none());
        rows.close().await;
    }

    #[tokio::test]
    async fn test_into_stream_adapter() {
        let (_dir, settings) = seeded_file().await;
        let values: Vec<i64> = stream(&settings, "SELECT v FROM n ORDER BY v DESC", [])
            .await
            .unwrap()
            .into_stream()
            .map_ok(|row| row.get("v").and_then(|v| v.as_i64()).unwrap_or_default())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(values, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_cancelled_pull_reports_abandoned_stream() {
        let (_dir, settings) = seeded_file().await;
        let mut rows = stream(&settings, "SELECT v FROM n ORDER BY v", [])
            .await
            .unwrap();

        // Queues the pull, then gives up before the producer can answer
        let timed_out = tokio::time::timeout(std::time::Duration::ZERO, rows.next()).await;
        assert!(timed_out.is_err());

        let err = rows.next().await.unwrap().unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err}");
        assert!(rows.is_finished());
        assert!(rows.next().await.is_none());
        rows.close().await;
    }
}
