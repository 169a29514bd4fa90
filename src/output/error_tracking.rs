use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use crate::metric::Metric;

use super::{AggregatingOutput, Output};

/// Field added to the first metric of a batch whose write failed.
pub const ERROR_COUNT_FIELD: &str = "error_count";

/// Decorator that observes write failures of the wrapped output.
///
/// A failed write is logged, counted, and annotated on the batch by setting
/// `error_count = 1` on its first metric. The wrapped output's error is
/// returned unchanged.
pub struct ErrorTracking<O> {
    inner: O,
    write_errors: u64,
}

impl<O: Output> ErrorTracking<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            write_errors: 0,
        }
    }

    /// Number of failed writes observed so far.
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: Output> Output for ErrorTracking<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn connect(&mut self) -> Result<()> {
        self.inner.connect().await
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        let result = self.inner.write(metrics).await;

        if let Err(e) = &result {
            self.write_errors += 1;
            error!(
                output = self.inner.name(),
                metrics = metrics.len(),
                error = %e,
                "error writing metrics",
            );

            // Empty batch: nothing to annotate.
            if let Some(first) = metrics.first_mut() {
                first.add_field(ERROR_COUNT_FIELD, 1i64);
            }
        }

        result
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

impl<O: AggregatingOutput> AggregatingOutput for ErrorTracking<O> {
    type Aggregator = O::Aggregator;

    fn aggregator(&self) -> Arc<Self::Aggregator> {
        self.inner.aggregator()
    }
}
