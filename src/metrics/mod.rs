//! Metrics sink abstraction for allocation gauges.
//!
//! The supervisor publishes resource-usage gauges through an injected
//! [`StatsSink`]; nothing in this crate holds process-wide metric state.

mod backend;
mod noop;

pub use backend::{SinkHandle, StatsSink};
pub use noop::NoopSink;
