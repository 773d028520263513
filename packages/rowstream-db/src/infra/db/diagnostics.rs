/// Process-wide connection lifecycle counters
pub mod connection_counters {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing::debug;

    static OPENED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static CLOSED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static OPEN_FAILED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static CLOSE_FAILED_TOTAL: AtomicUsize = AtomicUsize::new(0);
    static QUERY_FAILED_TOTAL: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Snapshot {
        pub opened: usize,
        pub closed: usize,
        pub open_failed: usize,
        pub close_failed: usize,
        pub query_failed: usize,
    }

    impl Snapshot {
        /// Handles opened but not yet released.
        pub fn open_handles(&self) -> usize {
            self.opened.saturating_sub(self.closed)
        }
    }

    pub fn opened() {
        OPENED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn closed() {
        CLOSED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn open_failed() {
        OPEN_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn close_failed() {
        CLOSE_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_failed() {
        QUERY_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot() -> Snapshot {
        Snapshot {
            opened: OPENED_TOTAL.load(Ordering::Relaxed),
            closed: CLOSED_TOTAL.load(Ordering::Relaxed),
            open_failed: OPEN_FAILED_TOTAL.load(Ordering::Relaxed),
            close_failed: CLOSE_FAILED_TOTAL.load(Ordering::Relaxed),
            query_failed: QUERY_FAILED_TOTAL.load(Ordering::Relaxed),
        }
    }

    /// Emit the current totals at debug level.
    pub fn log_snapshot(label: &str) {
        let s = snapshot();
        debug!(
            open_handles = s.open_handles(),
            label = label,
            opened = s.opened,
            closed = s.closed,
            open_failed = s.open_failed,
            close_failed = s.close_failed,
            query_failed = s.query_failed,
            "connection counters"
        );
    }
}
