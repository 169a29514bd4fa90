use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metric::Metric;
use crate::output::buffer::MetricBuffer;
use crate::output::running::{FlushFailure, FlushReport, RunningOutput};
use crate::output::{AggregatingOutput, Output};

use super::stats::AgentStats;

/// Flush timing and sizing for one output.
#[derive(Debug, Clone, Copy)]
pub struct FlushSettings {
    pub interval: Duration,
    pub batch_size: usize,
    /// Capacity of the output's [`MetricBuffer`]. The router queue feeding
    /// it is sized the same, so bursts of up to this many metrics are
    /// queued before any is dropped.
    pub buffer_limit: usize,
}

fn flush_ticker(interval: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Folds one flush cycle into the agent counters.
///
/// A rejected batch is never retried, so its metrics count as dropped. Its
/// `error_count` annotation ends here: the failure stays visible through
/// `write_errors` and the log line below.
fn record(stats: &AgentStats, name: &str, result: Result<FlushReport, FlushFailure>) {
    let report = match result {
        Ok(report) => report,
        Err(failure) => {
            stats.record_write_error();
            warn!(
                output = name,
                rejected = failure.rejected.len(),
                error = format!("{:#}", failure.error),
                "flush failed, batch discarded",
            );
            failure.report
        }
    };

    stats.record_written(report.written);
    stats.record_dropped(report.dropped + report.failed);
    if report.written > 0 || report.dropped > 0 {
        debug!(
            output = name,
            written = report.written,
            dropped = report.dropped,
            "output flushed",
        );
    }
}

fn log_stopped<O: Output>(output: &RunningOutput<O>) {
    let stats = output.stats();
    info!(
        output = output.name(),
        writes = stats.writes,
        write_errors = stats.write_errors,
        metrics_written = stats.metrics_written,
        metrics_failed = stats.metrics_failed,
        last_write_ms = stats.last_write_duration.map(|d| d.as_millis() as u64),
        "flush loop stopped",
    );
}

async fn close<O: Output>(output: &mut RunningOutput<O>) {
    // Failure is already logged by RunningOutput; nothing else to do at shutdown.
    let _ = output.close().await;
}

/// Flush loop of a plain output.
///
/// Owns the output for its whole connected life: every write and the final
/// close happen on this task, in order. Metrics arrive over `rx` from the
/// router and are written on each tick, or early once a full batch is
/// buffered. On cancellation the queue is drained, flushed one last time,
/// and the output is closed.
pub async fn run_buffered<O: Output>(
    mut output: RunningOutput<O>,
    mut rx: mpsc::Receiver<Metric>,
    settings: FlushSettings,
    stats: Arc<AgentStats>,
    ctx: CancellationToken,
) {
    let name = output.name().to_string();
    let mut buffer = MetricBuffer::new(settings.buffer_limit);
    let mut ticker = flush_ticker(settings.interval);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                while let Ok(metric) = rx.try_recv() {
                    buffer.push(metric);
                }

                let result = output.flush_buffered(&mut buffer, settings.batch_size).await;
                record(&stats, &name, result);
                if !buffer.is_empty() {
                    error!(output = %name, metrics = buffer.len(), "discarding unwritten metrics at shutdown");
                    stats.record_dropped(buffer.len() as u64);
                }

                close(&mut output).await;
                log_stopped(&output);
                return;
            }

            Some(metric) = rx.recv() => {
                buffer.push(metric);
                if buffer.len() >= settings.batch_size {
                    let result = output.flush_buffered(&mut buffer, settings.batch_size).await;
                    record(&stats, &name, result);
                }
            }

            _ = ticker.tick() => {
                let result = output.flush_buffered(&mut buffer, settings.batch_size).await;
                record(&stats, &name, result);
            }
        }
    }
}

/// Flush loop of an aggregating output.
///
/// Each tick runs one `push`/`write`/`reset` cycle; `add` calls from the
/// collection path go to the shared aggregator and never wait on this task.
/// On cancellation a final cycle runs before the output is closed.
pub async fn run_aggregating<O: AggregatingOutput>(
    mut output: RunningOutput<O>,
    interval: Duration,
    stats: Arc<AgentStats>,
    ctx: CancellationToken,
) {
    let name = output.name().to_string();
    let mut ticker = flush_ticker(interval);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                let result = output.flush_aggregated().await;
                record(&stats, &name, result);

                close(&mut output).await;
                log_stopped(&output);
                return;
            }

            _ = ticker.tick() => {
                let result = output.flush_aggregated().await;
                record(&stats, &name, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use anyhow::{bail, Result};

    use super::*;
    use crate::output::discard::DiscardOutput;

    struct FlakyOutput {
        fail_on_write: usize,
        writes: usize,
    }

    impl Output for FlakyOutput {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn write(&mut self, _metrics: &mut [Metric]) -> Result<()> {
            self.writes += 1;
            if self.writes == self.fail_on_write {
                bail!("write {} rejected", self.writes);
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn metric() -> Metric {
        Metric::new(
            "diskio",
            [("name", "nvme0n1")],
            [("reads", 10u64)],
            SystemTime::UNIX_EPOCH,
        )
    }

    #[tokio::test]
    async fn test_buffered_loop_flushes_on_cancel_and_closes() {
        let mut output = RunningOutput::new("null", DiscardOutput::new());
        output.connect().await.expect("connect");

        let (tx, rx) = mpsc::channel(16);
        let stats = Arc::new(AgentStats::new());
        let ctx = CancellationToken::new();

        for _ in 0..5 {
            tx.send(metric()).await.expect("send");
        }

        let task = tokio::spawn(run_buffered(
            output,
            rx,
            FlushSettings {
                interval: Duration::from_secs(3600),
                batch_size: 100,
                buffer_limit: 1000,
            },
            Arc::clone(&stats),
            ctx.clone(),
        ));

        ctx.cancel();
        task.await.expect("flush task");

        assert_eq!(stats.snapshot().metrics_written, 5);
    }

    #[tokio::test]
    async fn test_buffered_loop_flushes_full_batch_early() {
        let mut output = RunningOutput::new("null", DiscardOutput::new());
        output.connect().await.expect("connect");

        let (tx, rx) = mpsc::channel(16);
        let stats = Arc::new(AgentStats::new());
        let ctx = CancellationToken::new();

        let task = tokio::spawn(run_buffered(
            output,
            rx,
            FlushSettings {
                interval: Duration::from_secs(3600),
                batch_size: 2,
                buffer_limit: 10,
            },
            Arc::clone(&stats),
            ctx.clone(),
        ));

        tx.send(metric()).await.expect("send");
        tx.send(metric()).await.expect("send");

        let deadline = Instant::now() + Duration::from_secs(5);
        while stats.snapshot().metrics_written < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stats.snapshot().metrics_written, 2);

        ctx.cancel();
        task.await.expect("flush task");
    }

    #[tokio::test]
    async fn test_failed_flush_counts_written_evicted_and_rejected() {
        let mut output = RunningOutput::new(
            "flaky",
            FlakyOutput {
                fail_on_write: 2,
                writes: 0,
            },
        );
        output.connect().await.expect("connect");

        let mut buffer = MetricBuffer::new(6);
        for _ in 0..8 {
            buffer.push(metric());
        }

        let stats = AgentStats::new();
        let result = output.flush_buffered(&mut buffer, 2).await;
        record(&stats, "flaky", result);

        let snap = stats.snapshot();
        assert_eq!(snap.metrics_written, 2);
        // Two evicted by the buffer, two in the rejected batch.
        assert_eq!(snap.metrics_dropped, 4);
        assert_eq!(snap.write_errors, 1);
        assert_eq!(buffer.len(), 2);
    }
}
