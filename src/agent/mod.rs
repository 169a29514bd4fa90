pub mod flush;
pub mod router;
pub mod stats;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregate::aggregated::Aggregated;
use crate::aggregate::BasicStats;
use crate::config::{Config, OutputConfig};
use crate::input::internal::InternalInput;
use crate::output::error_tracking::ErrorTracking;
use crate::output::kind::OutputKind;
use crate::output::running::RunningOutput;
use crate::output::{AggregatingOutput, Aggregator, Output};

use self::flush::FlushSettings;
use self::router::{MetricRouter, Route};
use self::stats::{AgentStats, AgentStatsSnapshot};

type PlainOutput = RunningOutput<ErrorTracking<OutputKind>>;
type SummaryOutput = RunningOutput<Aggregated<ErrorTracking<OutputKind>>>;

/// A configured output before its flush task takes ownership.
enum PendingOutput {
    Plain(PlainOutput),
    Aggregating(SummaryOutput),
}

impl PendingOutput {
    fn build(cfg: &OutputConfig) -> Self {
        let sink = ErrorTracking::new(OutputKind::from_config(cfg));
        let name = cfg.display_name();
        match &cfg.aggregate {
            None => Self::Plain(RunningOutput::new(name, sink)),
            Some(agg) => Self::Aggregating(RunningOutput::new(
                name,
                Aggregated::new(sink, BasicStats::new(&agg.stats)),
            )),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Plain(o) => o.connect().await,
            Self::Aggregating(o) => o.connect().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Plain(o) => o.close().await,
            Self::Aggregating(o) => o.close().await,
        }
    }
}

/// Agent wires inputs to outputs and owns every background task.
///
/// Each output is owned by exactly one flush task, which performs all of its
/// writes and its final close. Inputs only ever see a [`MetricRouter`].
pub struct Agent {
    cfg: Config,
    stats: Arc<AgentStats>,
    router: Option<MetricRouter>,
    input_cancel: CancellationToken,
    output_cancel: CancellationToken,
    input_tasks: Vec<JoinHandle<()>>,
    flush_tasks: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Creates a new Agent from a validated configuration.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("validating configuration")?;

        Ok(Self {
            cfg,
            stats: Arc::new(AgentStats::new()),
            router: None,
            input_cancel: CancellationToken::new(),
            output_cancel: CancellationToken::new(),
            input_tasks: Vec::new(),
            flush_tasks: Vec::new(),
        })
    }

    /// Connects every output, then starts the flush loops and inputs.
    ///
    /// If any output fails to connect, the outputs connected so far are
    /// closed and the error is returned; nothing is left running.
    pub async fn start(&mut self) -> Result<()> {
        let mut pending: Vec<PendingOutput> = Vec::with_capacity(self.cfg.outputs.len());

        for out_cfg in &self.cfg.outputs {
            let mut output = PendingOutput::build(out_cfg);
            if let Err(e) = output.connect().await {
                for connected in &mut pending {
                    let _ = connected.close().await;
                }
                return Err(e);
            }
            pending.push(output);
        }

        let settings = FlushSettings {
            interval: self.cfg.agent.flush_interval,
            batch_size: self.cfg.agent.metric_batch_size,
            buffer_limit: self.cfg.agent.metric_buffer_limit,
        };

        let mut routes = Vec::with_capacity(pending.len());
        for output in pending {
            match output {
                PendingOutput::Plain(output) => {
                    // Queue and flush buffer each hold up to buffer_limit.
                    let (tx, rx) = mpsc::channel(settings.buffer_limit);
                    routes.push(Route::Buffered {
                        output: Arc::from(output.name()),
                        tx,
                    });
                    self.flush_tasks.push(tokio::spawn(flush::run_buffered(
                        output,
                        rx,
                        settings,
                        Arc::clone(&self.stats),
                        self.output_cancel.child_token(),
                    )));
                }
                PendingOutput::Aggregating(output) => {
                    let aggregator: Arc<dyn Aggregator> = output.aggregator();
                    routes.push(Route::Aggregating { aggregator });
                    self.flush_tasks.push(tokio::spawn(flush::run_aggregating(
                        output,
                        settings.interval,
                        Arc::clone(&self.stats),
                        self.output_cancel.child_token(),
                    )));
                }
            }
        }

        let router = MetricRouter::new(routes, self.global_tags(), Arc::clone(&self.stats));

        if self.cfg.inputs.internal.enabled {
            let input = InternalInput::new(Arc::clone(&self.stats), self.cfg.agent.interval);
            self.input_tasks.push(tokio::spawn(
                input.run(router.clone(), self.input_cancel.child_token()),
            ));
        }

        self.router = Some(router);

        info!(
            outputs = self.flush_tasks.len(),
            inputs = self.input_tasks.len(),
            "agent started",
        );

        Ok(())
    }

    /// Handle for feeding metrics into the running agent. `None` before
    /// `start` and after `stop`.
    pub fn router(&self) -> Option<MetricRouter> {
        self.router.clone()
    }

    pub fn stats(&self) -> AgentStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops inputs first, then flushes and closes every output.
    pub async fn stop(&mut self) -> Result<()> {
        self.input_cancel.cancel();
        for task in self.input_tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "input task failed");
            }
        }

        self.router = None;

        self.output_cancel.cancel();
        for task in self.flush_tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "flush task failed");
            }
        }

        let snap = self.stats.snapshot();
        if snap.write_errors > 0 || snap.metrics_dropped > 0 {
            warn!(
                write_errors = snap.write_errors,
                dropped = snap.metrics_dropped,
                "agent stopped with losses",
            );
        }
        info!(
            gathered = snap.metrics_gathered,
            written = snap.metrics_written,
            "agent stopped",
        );

        Ok(())
    }

    /// Tags stamped onto every metric, sorted for stable output.
    fn global_tags(&self) -> Vec<(String, String)> {
        let mut tags: Vec<(String, String)> = self
            .cfg
            .agent
            .global_tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !self.cfg.agent.hostname.is_empty() && !self.cfg.agent.global_tags.contains_key("host")
        {
            tags.push(("host".to_string(), self.cfg.agent.hostname.clone()));
        }
        tags.sort();
        tags
    }
}
