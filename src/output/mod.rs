pub mod buffer;
pub mod discard;
pub mod error_tracking;
pub mod file;
pub mod kind;
pub mod running;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use crate::metric::Metric;

/// Output is a sink that collected metrics are written to.
///
/// Lifecycle is linear: `connect` once, `write` any number of times, `close`
/// once. The `&mut self` receivers mean a single owner can never overlap two
/// writes or close while a write is pending.
pub trait Output: Send {
    /// Returns the output's name for logging.
    fn name(&self) -> &str;

    /// Establish the sink resource. Called exactly once before any write.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Deliver one batch. The whole batch is accepted or the call fails.
    fn write(&mut self, metrics: &mut [Metric]) -> impl Future<Output = Result<()>> + Send;

    /// Release the sink resource. Called once, after the last write returned.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Concurrent accumulation state behind an [`AggregatingOutput`].
///
/// `add` runs on the collection path while `push` and `reset` run on the
/// flush path, so every implementation synchronizes internally.
pub trait Aggregator: Send + Sync {
    /// Fold one metric into the current aggregation period.
    fn add(&self, metric: &Metric);

    /// Snapshot of the current period, one metric per series. Does not clear.
    fn push(&self) -> Vec<Metric>;

    /// Start a new, empty aggregation period.
    fn reset(&self);
}

/// An output that only accepts periodic aggregates of what it was given.
///
/// The aggregator handle is shared with the collection path; the sink itself
/// stays with whoever owns the output.
pub trait AggregatingOutput: Output {
    type Aggregator: Aggregator + 'static;

    /// Returns a shared handle to the accumulation state.
    fn aggregator(&self) -> Arc<Self::Aggregator>;

    /// Add the metric to the aggregator.
    fn add(&self, metric: &Metric) {
        self.aggregator().add(metric);
    }

    /// Returns the aggregated metrics for this flush interval.
    fn push(&self) -> Vec<Metric> {
        self.aggregator().push()
    }

    /// Signals that the aggregation period is complete.
    fn reset(&self) {
        self.aggregator().reset();
    }
}
