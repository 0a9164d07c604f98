//! # Periodic resource usage sampling.
//!
//! [`StatsCollector`] is spawned by the supervisor next to a live handle.
//! It samples [`DriverHandle::stats`](crate::DriverHandle::stats) once
//! immediately and then at the configured interval, stores the latest
//! sample for [`Supervisor::latest_task_stats`](crate::Supervisor::latest_task_stats),
//! and publishes gauges to the [`StatsSink`](crate::StatsSink).
//!
//! # High-level architecture
//!
//! ```text
//!   ┌──────────────┐   stats()    ┌──────────────┐
//!   │ DriverHandle │ ◄─────────── │StatsCollector│ ◄── stop token
//!   └──────────────┘              └──────┬───────┘
//!                                 latest │ gauges
//!                                        ▼
//!                           latest_stats + StatsSink
//! ```
//!
//! Error policy:
//! - `NotImplemented` ends collection permanently.
//! - `TransportClosed` is suppressed (benign race with stopping).
//! - anything else is logged at warn and sampling continues.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{driver::HandleRef, error::StatsError, metrics::SinkHandle};

/// Resource usage reported by a driver handle.
///
/// Each sub-struct is optional; a driver fills in what it measures.
#[derive(Clone, Debug, Default)]
pub struct ResourceUsage {
    /// Row-change counters of the replicated table stream.
    pub table: Option<TableStats>,
    /// Replication delay behind the source.
    pub delay: Option<DelayStats>,
    /// Applied-event throughput.
    pub throughput: Option<ThroughputStats>,
}

/// Row-change counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableStats {
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
}

/// Replication delay sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct DelayStats {
    /// Events currently delayed.
    pub num: u64,
    /// Delay behind the source in milliseconds.
    pub time_ms: u64,
}

/// Throughput sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThroughputStats {
    /// Events applied in the window.
    pub num: u64,
    /// Window length in milliseconds.
    pub time_ms: u64,
}

/// Label set for gauge keys, fixed per supervisor.
#[derive(Clone, Debug)]
pub(crate) struct StatsLabels {
    pub job_name: String,
    pub task_key: String,
    pub alloc_id: String,
    pub task_type: String,
}

/// Samples resource usage from one handle until stopped.
pub(crate) struct StatsCollector {
    pub handle: HandleRef,
    pub interval: Duration,
    pub latest: Arc<RwLock<Option<ResourceUsage>>>,
    pub sink: SinkHandle,
    pub labels: StatsLabels,
    pub publish: bool,
}

impl StatsCollector {
    /// Runs the sampling loop. Returns when `stop` is cancelled, or
    /// permanently when the driver reports stats as not implemented.
    pub(crate) async fn run(self, stop: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let sample = self.handle.stats().await;

            // The sample may have raced with the stop signal; never publish
            // after the stop token is observed cancelled.
            if stop.is_cancelled() {
                return;
            }

            match sample {
                Ok(usage) => {
                    *self.latest.write().unwrap() = Some(usage.clone());
                    self.emit(&usage);
                }
                Err(StatsError::NotImplemented) => {
                    debug!(
                        task = %self.labels.task_type,
                        alloc = %self.labels.alloc_id,
                        "driver does not support stats"
                    );
                    return;
                }
                Err(StatsError::TransportClosed) => {}
                Err(err) => {
                    warn!(
                        task = %self.labels.task_type,
                        error = %err,
                        "error fetching task stats"
                    );
                }
            }
        }
    }

    /// Publishes one sample as gauges, gated on the metrics toggle and on
    /// each sub-struct being present.
    fn emit(&self, usage: &ResourceUsage) {
        if !self.publish {
            return;
        }
        if let Some(table) = &usage.table {
            self.gauge("table", "insert", table.insert_count as f32);
            self.gauge("table", "update", table.update_count as f32);
            self.gauge("table", "delete", table.delete_count as f32);
        }
        if let Some(delay) = &usage.delay {
            self.gauge("delay", "num", delay.num as f32);
            self.gauge("delay", "time", delay.time_ms as f32);
        }
        if let Some(throughput) = &usage.throughput {
            self.gauge("throughput", "num", throughput.num as f32);
            self.gauge("throughput", "time", throughput.time_ms as f32);
        }
    }

    fn gauge(&self, group: &str, name: &str, value: f32) {
        self.sink.set_gauge(
            &[
                "client",
                "allocs",
                &self.labels.job_name,
                &self.labels.task_key,
                &self.labels.alloc_id,
                &self.labels.task_type,
                group,
                name,
            ],
            value,
        );
    }
}
