//! Lock-free ingest counters and periodic reporting
//!
//! Connection workers bump these from many tasks at once, so every counter is
//! an atomic. The raw-ingest counter is read-and-reset by the scheduler; the
//! rest are monotonic totals for the Prometheus endpoint.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free ingest metrics collector
pub struct Metrics {
    /// Records handed off since the last raw report (reset on report)
    raw_since_report: AtomicU64,
    /// Records handed off to the scheduler (monotonic)
    records_total: AtomicU64,
    /// Records dropped by the time window filter (monotonic)
    records_out_of_window: AtomicU64,
    /// Lines that failed to parse, each closing its connection (monotonic)
    parse_errors: AtomicU64,
    /// Connections torn down by a read failure (monotonic)
    read_errors: AtomicU64,
    /// Connections admitted through the gate (monotonic)
    connections_accepted: AtomicU64,
    /// Connections fully closed and their slot released (monotonic)
    connections_closed: AtomicU64,
    /// Flush ticks executed (monotonic)
    flushes_total: AtomicU64,
    /// Aggregates written to the flush sink (monotonic)
    aggregates_emitted: AtomicU64,
    /// Last raw report time (only touched by the scheduler)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            raw_since_report: AtomicU64::new(0),
            records_total: AtomicU64::new(0),
            records_out_of_window: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            connections_accepted: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            flushes_total: AtomicU64::new(0),
            aggregates_emitted: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record a successful hand-off to the scheduler (lock-free)
    #[inline]
    pub fn record_handed_off(&self) {
        self.raw_since_report.fetch_add(1, Ordering::Relaxed);
        self.records_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_out_of_window(&self) {
        self.records_out_of_window.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one flush tick and how many aggregates it emitted
    #[inline]
    pub fn record_flush(&self, aggregates: usize) {
        self.flushes_total.fetch_add(1, Ordering::Relaxed);
        self.aggregates_emitted.fetch_add(aggregates as u64, Ordering::Relaxed);
    }

    /// Read and reset the raw-ingest counter
    ///
    /// Only the scheduler calls this, so the swap and the timestamp update
    /// never race with another report.
    pub fn take_raw_report(&self) -> RawReport {
        let records = self.raw_since_report.swap(0, Ordering::Relaxed);
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let records_per_sec = if elapsed.as_secs_f64() > 0.0 {
            records as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        RawReport { records, records_per_sec }
    }

    /// Snapshot of monotonic counters (does not reset anything)
    pub fn snapshot(&self, active_connections: usize) -> MetricsSummary {
        MetricsSummary {
            records_total: self.records_total.load(Ordering::Relaxed),
            records_out_of_window: self.records_out_of_window.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            active_connections,
            flushes_total: self.flushes_total.load(Ordering::Relaxed),
            aggregates_emitted: self.aggregates_emitted.load(Ordering::Relaxed),
        }
    }

    /// Current raw counter value without resetting
    #[inline]
    pub fn raw_since_report(&self) -> u64 {
        self.raw_since_report.load(Ordering::Relaxed)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one raw-counter tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReport {
    /// Records handed off since the previous report
    pub records: u64,
    pub records_per_sec: f64,
}

impl RawReport {
    pub fn log(&self, interval_secs: u64) {
        info!(
            records = %self.records,
            interval_secs = %interval_secs,
            records_per_sec = format!("{:.1}", self.records_per_sec),
            "raw_ingest_report"
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub records_total: u64,
    pub records_out_of_window: u64,
    pub parse_errors: u64,
    pub read_errors: u64,
    pub connections_accepted: u64,
    pub connections_closed: u64,
    /// Admission slots currently held (gauge)
    pub active_connections: usize,
    pub flushes_total: u64,
    pub aggregates_emitted: u64,
}
