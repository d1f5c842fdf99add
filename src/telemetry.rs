//! Process-wide cursor counters.
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub attempts_total: AtomicU64,
    pub transient_failures_total: AtomicU64,
    pub permanent_failures_total: AtomicU64,
    pub recreates_total: AtomicU64,
    pub retries_exhausted_total: AtomicU64,
    pub records_total: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts_total: u64,
    pub transient_failures_total: u64,
    pub permanent_failures_total: u64,
    pub recreates_total: u64,
    pub retries_exhausted_total: u64,
    pub records_total: u64,
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

pub(crate) fn record_attempt() {
    METRICS.attempts_total.fetch_add(1, Ordering::Relaxed);
}
pub(crate) fn record_transient() {
    METRICS.transient_failures_total.fetch_add(1, Ordering::Relaxed);
}
pub(crate) fn record_permanent() {
    METRICS.permanent_failures_total.fetch_add(1, Ordering::Relaxed);
}
pub(crate) fn record_recreate() {
    METRICS.recreates_total.fetch_add(1, Ordering::Relaxed);
}
pub(crate) fn record_exhausted() {
    METRICS.retries_exhausted_total.fetch_add(1, Ordering::Relaxed);
}
pub(crate) fn record_records(n: usize) {
    METRICS.records_total.fetch_add(n as u64, Ordering::Relaxed);
}

#[must_use]
pub fn snapshot() -> MetricsSnapshot {
    let m = &*METRICS;
    MetricsSnapshot {
        attempts_total: m.attempts_total.load(Ordering::Relaxed),
        transient_failures_total: m.transient_failures_total.load(Ordering::Relaxed),
        permanent_failures_total: m.permanent_failures_total.load(Ordering::Relaxed),
        recreates_total: m.recreates_total.load(Ordering::Relaxed),
        retries_exhausted_total: m.retries_exhausted_total.load(Ordering::Relaxed),
        records_total: m.records_total.load(Ordering::Relaxed),
    }
}

/// OpenMetrics/Prometheus exposition (no TYPE/HELP lines).
#[must_use]
pub fn metrics_text() -> String {
    let s = snapshot();
    format!(
        "nexus_cursor_attempts_total {}\n\
         nexus_cursor_transient_failures_total {}\n\
         nexus_cursor_permanent_failures_total {}\n\
         nexus_cursor_recreates_total {}\n\
         nexus_cursor_retries_exhausted_total {}\n\
         nexus_cursor_records_total {}\n",
        s.attempts_total,
        s.transient_failures_total,
        s.permanent_failures_total,
        s.recreates_total,
        s.retries_exhausted_total,
        s.records_total,
    )
}
