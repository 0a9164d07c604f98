use std::sync::Arc;

/// Gauge sink interface for allocation metrics.
///
/// This trait abstracts metric publication across backends. An
/// implementation is injected into the supervisor and used by the stats
/// collector; keys are hierarchical paths such as
/// `["client", "allocs", job, task_key, alloc_id, task_type, "table", "insert"]`.
pub trait StatsSink: Send + Sync + 'static {
    /// Sets the gauge at `key` to `value`.
    ///
    /// Called from the collector task at the configured sampling interval.
    /// Implementations must be cheap and non-blocking.
    fn set_gauge(&self, key: &[&str], value: f32);
}

/// Shared handle to a stats sink.
///
/// Stored in the supervisor and cloned into each collector incarnation.
pub type SinkHandle = Arc<dyn StatsSink>;
