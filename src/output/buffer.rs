use std::collections::VecDeque;

use crate::metric::Metric;

/// Bounded FIFO of metrics waiting for the next flush of a plain output.
///
/// When the buffer is full the oldest metric is evicted so that recent data
/// wins. Evictions are counted and can be read back with [`take_dropped`].
///
/// [`take_dropped`]: MetricBuffer::take_dropped
#[derive(Debug)]
pub struct MetricBuffer {
    limit: usize,
    metrics: VecDeque<Metric>,
    dropped: u64,
}

impl MetricBuffer {
    /// Creates a buffer holding at most `limit` metrics (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            metrics: VecDeque::with_capacity(limit.min(1024)),
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Appends a metric, evicting the oldest one if the buffer is full.
    pub fn push(&mut self, metric: Metric) {
        if self.metrics.len() >= self.limit {
            self.metrics.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        self.metrics.push_back(metric);
    }

    /// Removes and returns up to `max` metrics in arrival order.
    pub fn batch(&mut self, max: usize) -> Vec<Metric> {
        let n = max.min(self.metrics.len());
        self.metrics.drain(..n).collect()
    }

    /// Returns the number of evicted metrics since the last call and resets it.
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }
}
