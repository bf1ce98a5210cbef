//! Scheduler - the single control loop that owns the aggregation store
//!
//! Three event sources are serialized through one `select!`:
//! - hand-off arrival: fold the record into the store
//! - raw tick: read-and-reset the raw ingest counter and report it
//! - flush tick: drain the store and write the window to the sink
//!
//! The store is a plain field of this struct and `run` consumes `self`, so no
//! other task can reach it. Resets therefore never interleave with a fold.

use crate::domain::types::Record;
use crate::infra::config::{Config, MAX_INTERVAL};
use crate::infra::metrics::Metrics;
use crate::io::sink::AggregateSink;
use crate::services::store::AggregationStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

pub struct Scheduler<S> {
    store: AggregationStore,
    sink: S,
    metrics: Arc<Metrics>,
    raw_report_interval: Duration,
    flush_interval: Duration,
}

impl<S: AggregateSink> Scheduler<S> {
    pub fn new(config: &Config, sink: S, metrics: Arc<Metrics>) -> Self {
        Self {
            store: AggregationStore::new(),
            sink,
            metrics,
            raw_report_interval: config.raw_report_interval(),
            flush_interval: config.flush_interval(),
        }
    }

    /// Run until shutdown or until every hand-off sender is gone
    ///
    /// Records still buffered in the hand-off channel at shutdown are folded,
    /// then one last window is flushed. Returns the sink.
    pub async fn run(
        mut self,
        mut handoff_rx: mpsc::Receiver<Record>,
        mut shutdown: watch::Receiver<bool>,
    ) -> S {
        // Ticks start one full period from now, not immediately
        let now = Instant::now();
        let mut raw_tick =
            interval_at(first_tick(now, self.raw_report_interval), self.raw_report_interval);
        let mut flush_tick =
            interval_at(first_tick(now, self.flush_interval), self.flush_interval);
        raw_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            raw_report_interval_secs = %self.raw_report_interval.as_secs(),
            flush_interval_secs = %self.flush_interval.as_secs(),
            "scheduler_started"
        );

        loop {
            tokio::select! {
                record = handoff_rx.recv() => {
                    match record {
                        Some(record) => self.store.fold(record),
                        None => {
                            info!("scheduler_handoff_closed");
                            break;
                        }
                    }
                }
                _ = raw_tick.tick() => {
                    self.report_raw();
                }
                _ = flush_tick.tick() => {
                    self.flush();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let mut pending = 0usize;
                        while let Ok(record) = handoff_rx.try_recv() {
                            self.store.fold(record);
                            pending += 1;
                        }
                        info!(pending = %pending, "scheduler_shutdown");
                        break;
                    }
                }
            }
        }

        self.flush();
        info!("scheduler_stopped");
        self.sink
    }

    fn report_raw(&self) {
        let report = self.metrics.take_raw_report();
        report.log(self.raw_report_interval.as_secs());
    }

    fn flush(&mut self) {
        let aggregates = self.store.drain_all();
        self.metrics.record_flush(aggregates.len());
        if aggregates.is_empty() {
            debug!("window_flushed_empty");
            return;
        }

        if let Err(e) = self.sink.write_window(&aggregates) {
            error!(error = %e, aggregates = %aggregates.len(), "window_flush_failed");
            return;
        }
        info!(aggregates = %aggregates.len(), "window_flushed");
    }
}

/// `now + period`, capped so an oversized period cannot overflow the clock
fn first_tick(now: Instant, period: Duration) -> Instant {
    now.checked_add(period.min(MAX_INTERVAL)).unwrap_or(now)
}
