use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::metric::Metric;

use super::buffer::MetricBuffer;
use super::{AggregatingOutput, Output};

/// Lifecycle position of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Unconnected,
    Connected,
    /// `connect` returned an error; the output is unusable for this run.
    Failed,
    Closed,
}

/// Calls made out of lifecycle order. These are bugs in the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("output {name}: connect called in state {state:?}")]
    InvalidConnect { name: String, state: OutputState },

    #[error("output {name}: write called before connect")]
    WriteBeforeConnect { name: String },

    #[error("output {name}: write called after connect failed")]
    WriteAfterFailedConnect { name: String },

    #[error("output {name}: write called after close")]
    WriteAfterClose { name: String },

    #[error("output {name}: close called in state {state:?}")]
    InvalidClose { name: String, state: OutputState },
}

/// Write counters for one output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStats {
    pub writes: u64,
    pub write_errors: u64,
    pub metrics_written: u64,
    pub metrics_failed: u64,
    pub last_write_duration: Option<Duration>,
}

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Metrics the sink accepted.
    pub written: u64,
    /// Metrics in the batch whose write failed. They are not retried.
    pub failed: u64,
    /// Metrics evicted from the buffer before they could be written.
    pub dropped: u64,
}

/// A flush cycle that stopped at a failed write.
///
/// Carries what the cycle achieved before the failure and the rejected
/// batch as the output left it, so `error_count` set by
/// [`ErrorTracking`](super::error_tracking::ErrorTracking) stays visible to
/// the caller.
#[derive(Debug)]
pub struct FlushFailure {
    pub report: FlushReport,
    pub rejected: Vec<Metric>,
    pub error: anyhow::Error,
}

impl FlushFailure {
    fn violation(error: anyhow::Error) -> Self {
        Self {
            report: FlushReport::default(),
            rejected: Vec::new(),
            error,
        }
    }
}

/// Lifecycle guard around an output.
///
/// Enforces `Unconnected -> Connected -> Closed`, rejects calls made out of
/// order with a [`LifecycleError`], logs transitions and keeps write stats.
pub struct RunningOutput<O> {
    name: String,
    output: O,
    state: OutputState,
    stats: OutputStats,
}

impl<O: Output> RunningOutput<O> {
    /// Wraps `output` under the given name. An empty name falls back to
    /// the output's own name.
    pub fn new(name: impl Into<String>, output: O) -> Self {
        let mut name = name.into();
        if name.is_empty() {
            name = output.name().to_string();
        }
        Self {
            name,
            output,
            state: OutputState::Unconnected,
            stats: OutputStats::default(),
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    pub fn stats(&self) -> OutputStats {
        self.stats
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    fn check_writable(&self) -> Result<(), LifecycleError> {
        let name = self.name.clone();
        match self.state {
            OutputState::Connected => Ok(()),
            OutputState::Unconnected => Err(LifecycleError::WriteBeforeConnect { name }),
            OutputState::Failed => Err(LifecycleError::WriteAfterFailedConnect { name }),
            OutputState::Closed => Err(LifecycleError::WriteAfterClose { name }),
        }
    }

    fn violation(&self, err: LifecycleError) -> anyhow::Error {
        error!(output = %self.name, error = %err, "output lifecycle violation");
        err.into()
    }

    /// Writes every buffered metric in batches of at most `batch_size`.
    ///
    /// Stops at the first failed batch. That batch is not retried: it is
    /// handed back in [`FlushFailure::rejected`] and counted in
    /// `report.failed`, while the remaining metrics stay buffered for the
    /// next flush. Evictions since the last flush are reported either way.
    pub async fn flush_buffered(
        &mut self,
        buffer: &mut MetricBuffer,
        batch_size: usize,
    ) -> Result<FlushReport, FlushFailure> {
        let mut report = FlushReport {
            dropped: buffer.take_dropped(),
            ..FlushReport::default()
        };
        let batch_size = batch_size.max(1);

        while !buffer.is_empty() {
            let mut batch = buffer.batch(batch_size);
            let n = batch.len() as u64;
            if let Err(e) = self.write(&mut batch).await {
                report.failed = n;
                return Err(FlushFailure {
                    report,
                    rejected: batch,
                    error: e.context(format!("flushing output {}", self.name)),
                });
            }
            report.written += n;
        }

        Ok(report)
    }
}

impl<O: AggregatingOutput> RunningOutput<O> {
    /// Runs one aggregation flush cycle: `push`, `write`, `reset`.
    ///
    /// An empty snapshot is not written. `reset` always runs, also after a
    /// failed write, so the next period starts clean; the rejected
    /// aggregates are returned in [`FlushFailure::rejected`].
    pub async fn flush_aggregated(&mut self) -> Result<FlushReport, FlushFailure> {
        self.check_writable()
            .map_err(|e| FlushFailure::violation(self.violation(e)))?;

        let mut batch = self.output.push();
        let n = batch.len() as u64;
        let result = if batch.is_empty() {
            Ok(())
        } else {
            self.write(&mut batch).await
        };
        self.output.reset();

        match result {
            Ok(()) => Ok(FlushReport {
                written: n,
                ..FlushReport::default()
            }),
            Err(e) => Err(FlushFailure {
                report: FlushReport {
                    failed: n,
                    ..FlushReport::default()
                },
                rejected: batch,
                error: e.context(format!("flushing aggregates of output {}", self.name)),
            }),
        }
    }
}

impl<O: Output> Output for RunningOutput<O> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<()> {
        if self.state != OutputState::Unconnected {
            return Err(self.violation(LifecycleError::InvalidConnect {
                name: self.name.clone(),
                state: self.state,
            }));
        }

        match self.output.connect().await {
            Ok(()) => {
                self.state = OutputState::Connected;
                info!(output = %self.name, "output connected");
                Ok(())
            }
            Err(e) => {
                self.state = OutputState::Failed;
                error!(output = %self.name, error = %e, "output connect failed");
                Err(e.context(format!("connecting output {}", self.name)))
            }
        }
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        self.check_writable().map_err(|e| self.violation(e))?;

        let start = Instant::now();
        let result = self.output.write(metrics).await;
        let elapsed = start.elapsed();

        let n = metrics.len() as u64;
        self.stats.writes += 1;
        self.stats.last_write_duration = Some(elapsed);
        match &result {
            Ok(()) => {
                self.stats.metrics_written += n;
                debug!(
                    output = %self.name,
                    metrics = n,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "wrote batch",
                );
            }
            Err(_) => {
                self.stats.write_errors += 1;
                self.stats.metrics_failed += n;
            }
        }

        result
    }

    async fn close(&mut self) -> Result<()> {
        if self.state != OutputState::Connected {
            return Err(self.violation(LifecycleError::InvalidClose {
                name: self.name.clone(),
                state: self.state,
            }));
        }

        self.state = OutputState::Closed;
        let result = self.output.close().await;
        match &result {
            Ok(()) => info!(output = %self.name, "output closed"),
            Err(e) => error!(output = %self.name, error = %e, "output close failed"),
        }
        result
    }
}

impl<O: AggregatingOutput> AggregatingOutput for RunningOutput<O> {
    type Aggregator = O::Aggregator;

    fn aggregator(&self) -> Arc<Self::Aggregator> {
        self.output.aggregator()
    }
}
