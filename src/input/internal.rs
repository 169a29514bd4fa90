use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::router::MetricRouter;
use crate::agent::stats::AgentStats;
use crate::metric::{FieldValue, Metric};

/// Name of the self-telemetry metric.
pub const INTERNAL_METRIC: &str = "internal_agent";

/// Reports the agent's own counters as a metric every collection interval.
pub struct InternalInput {
    stats: Arc<AgentStats>,
    interval: Duration,
}

impl InternalInput {
    pub fn new(stats: Arc<AgentStats>, interval: Duration) -> Self {
        Self { stats, interval }
    }

    /// Builds one `internal_agent` metric from the current counters.
    pub fn gather(&self) -> Metric {
        let snap = self.stats.snapshot();
        Metric::new(
            INTERNAL_METRIC,
            [] as [(&str, &str); 0],
            [
                ("metrics_gathered", FieldValue::UInt(snap.metrics_gathered)),
                ("metrics_written", FieldValue::UInt(snap.metrics_written)),
                ("metrics_dropped", FieldValue::UInt(snap.metrics_dropped)),
                ("write_errors", FieldValue::UInt(snap.write_errors)),
            ],
            SystemTime::now(),
        )
    }

    /// Gathers on every tick until `ctx` is cancelled.
    pub async fn run(self, router: MetricRouter, ctx: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("internal input stopped");
                    return;
                }
                _ = ticker.tick() => {
                    router.add(self.gather());
                }
            }
        }
    }
}
