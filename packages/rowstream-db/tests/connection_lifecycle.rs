//! Release-exactly-once checks driven by the process-wide connection counters.
//!
//! Every test here is `#[serial]` so counter deltas belong to a single test.

mod common;

use std::time::Duration;

use rowstream_db::connection_counters::{self, Snapshot};
use rowstream_db::{execute_query, stream, with_connection, ScopedConnection, StoreError};
use serial_test::serial;
use test_support::{sample_users, TempStore};

fn delta(before: Snapshot) -> Snapshot {
    let now = connection_counters::snapshot();
    Snapshot {
        opened: now.opened - before.opened,
        closed: now.closed - before.closed,
        open_failed: now.open_failed - before.open_failed,
        close_failed: now.close_failed - before.close_failed,
        query_failed: now.query_failed - before.query_failed,
    }
}

/// Drop-driven releases finish on the producer task; give it a moment.
async fn wait_for_closed(before: Snapshot, expected: usize) -> Snapshot {
    for _ in 0..100 {
        let d = delta(before);
        if d.closed >= expected {
            return d;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    delta(before)
}

#[tokio::test]
#[serial]
async fn closes_once_on_success() {
    let store = TempStore::with_users(&sample_users(3)).await.unwrap();
    let before = connection_counters::snapshot();

    let rows = execute_query(&store.settings, "SELECT * FROM user_data", [])
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
    assert_eq!(d.close_failed, 0);
}

#[tokio::test]
#[serial]
async fn closes_once_when_consumer_fails() {
    let store = TempStore::with_users(&sample_users(3)).await.unwrap();
    let before = connection_counters::snapshot();

    let result: Result<(), StoreError> =
        with_connection(&store.settings, |_conn| async move {
            Err(StoreError::query("boom"))
        })
        .await;
    assert!(result.is_err());

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
}

#[tokio::test]
#[serial]
async fn closes_once_when_consumer_panics() {
    let store = TempStore::with_users(&sample_users(3)).await.unwrap();
    let settings = store.settings.clone();
    let before = connection_counters::snapshot();

    let joined = tokio::spawn(async move {
        with_connection(&settings, |_conn| async move {
            if true {
                panic!("consumer panicked mid-scope");
            }
            Ok::<(), StoreError>(())
        })
        .await
    })
    .await;
    assert!(joined.unwrap_err().is_panic());

    let d = wait_for_closed(before, 1).await;
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
}

#[tokio::test]
#[serial]
async fn dropped_guard_releases_once() {
    let store = TempStore::with_users(&sample_users(1)).await.unwrap();
    let before = connection_counters::snapshot();

    {
        let scope = ScopedConnection::acquire(&store.settings).await.unwrap();
        scope.fetch_all("SELECT * FROM user_data", []).await.unwrap();
        // leaves scope without release()
    }

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
}

#[tokio::test]
#[serial]
async fn unreachable_store_opens_and_closes_nothing() {
    let store = TempStore::empty();
    let before = connection_counters::snapshot();

    let err = execute_query(&store.unreachable(), "SELECT 1", [])
        .await
        .unwrap_err();
    assert!(err.is_connection());

    let d = delta(before);
    assert_eq!(d.opened, 0);
    assert_eq!(d.closed, 0);
    assert_eq!(d.open_failed, 1);
}

#[tokio::test]
#[serial]
async fn exhausted_stream_closes_once() {
    let store = TempStore::with_users(&sample_users(5)).await.unwrap();
    let before = connection_counters::snapshot();

    let mut rows = stream(&store.settings, "SELECT * FROM user_data", [])
        .await
        .unwrap();
    let mut seen = 0;
    while let Some(row) = rows.next().await {
        row.unwrap();
        seen += 1;
    }
    assert_eq!(seen, 5);
    rows.close().await;

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
}

#[tokio::test]
#[serial]
async fn stream_abandoned_after_first_row_closes_on_close() {
    let store = TempStore::with_users(&sample_users(5)).await.unwrap();
    let before = connection_counters::snapshot();

    let mut rows = stream(&store.settings, "SELECT * FROM user_data", [])
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap();
    rows.close().await;

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
}

#[tokio::test]
#[serial]
async fn stream_abandoned_after_first_row_closes_on_drop() {
    let store = TempStore::with_users(&sample_users(5)).await.unwrap();
    let before = connection_counters::snapshot();

    let mut rows = stream(&store.settings, "SELECT * FROM user_data", [])
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap();
    drop(rows);

    let d = wait_for_closed(before, 1).await;
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
}

#[tokio::test]
#[serial]
async fn stream_never_pulled_still_closes() {
    let store = TempStore::with_users(&sample_users(5)).await.unwrap();
    let before = connection_counters::snapshot();

    let rows = stream(&store.settings, "SELECT * FROM user_data", [])
        .await
        .unwrap();
    rows.close().await;

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
    assert_eq!(d.query_failed, 0);
}

#[tokio::test]
#[serial]
async fn failing_stream_query_still_closes() {
    let store = TempStore::with_users(&sample_users(1)).await.unwrap();
    let before = connection_counters::snapshot();

    let mut rows = stream(&store.settings, "SELECT nope FROM user_data", [])
        .await
        .unwrap();
    assert!(rows.next().await.unwrap().unwrap_err().is_query());
    rows.close().await;

    let d = delta(before);
    assert_eq!(d.opened, 1);
    assert_eq!(d.closed, 1);
    assert_eq!(d.query_failed, 1);
}
