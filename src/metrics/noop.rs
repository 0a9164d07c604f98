use crate::metrics::StatsSink;

/// Sink that discards every gauge.
///
/// The default when the embedding agent has no metrics pipeline wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl StatsSink for NoopSink {
    fn set_gauge(&self, _key: &[&str], _value: f32) {}
}
