use std::sync::Arc;

use anyhow::Result;

use crate::metric::Metric;
use crate::output::{AggregatingOutput, Output};

use super::BasicStats;

/// Any output turned into an [`AggregatingOutput`] by pairing it with a
/// [`BasicStats`] aggregator.
///
/// Writes go straight to the wrapped sink; the aggregator is shared with the
/// collection path through [`AggregatingOutput::aggregator`].
pub struct Aggregated<O> {
    inner: O,
    aggregator: Arc<BasicStats>,
}

impl<O: Output> Aggregated<O> {
    pub fn new(inner: O, aggregator: BasicStats) -> Self {
        Self {
            inner,
            aggregator: Arc::new(aggregator),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: Output> Output for Aggregated<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn connect(&mut self) -> Result<()> {
        self.inner.connect().await
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        self.inner.write(metrics).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

impl<O: Output> AggregatingOutput for Aggregated<O> {
    type Aggregator = BasicStats;

    fn aggregator(&self) -> Arc<BasicStats> {
        Arc::clone(&self.aggregator)
    }
}
