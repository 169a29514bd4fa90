use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::metric::Metric;
use crate::output::Aggregator;

use super::stats::AgentStats;

/// Where the collection path delivers metrics for one output.
#[derive(Clone)]
pub enum Route {
    /// Plain output: metrics queue up for its flush task.
    Buffered {
        output: Arc<str>,
        tx: mpsc::Sender<Metric>,
    },
    /// Aggregating output: metrics fold straight into its aggregator.
    Aggregating { aggregator: Arc<dyn Aggregator> },
}

/// Collection-path handle that fans metrics out to every output.
///
/// Cheap to clone; each input holds its own copy. The router never touches
/// a sink directly.
#[derive(Clone)]
pub struct MetricRouter {
    routes: Arc<[Route]>,
    global_tags: Arc<[(String, String)]>,
    stats: Arc<AgentStats>,
}

impl MetricRouter {
    pub fn new(
        routes: Vec<Route>,
        global_tags: Vec<(String, String)>,
        stats: Arc<AgentStats>,
    ) -> Self {
        Self {
            routes: routes.into(),
            global_tags: global_tags.into(),
            stats,
        }
    }

    /// Delivers one metric to every output.
    ///
    /// A plain output whose queue is full loses the metric; the drop is
    /// counted and logged.
    pub fn add(&self, mut metric: Metric) {
        for (key, value) in self.global_tags.iter() {
            metric.add_tag_if_absent(key, value);
        }
        self.stats.record_gathered(1);

        for route in self.routes.iter() {
            match route {
                Route::Aggregating { aggregator } => aggregator.add(&metric),
                Route::Buffered { output, tx } => match tx.try_send(metric.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.stats.record_dropped(1);
                        warn!(output = %output, "output queue full, dropping metric");
                    }
                    Err(TrySendError::Closed(_)) => {
                        self.stats.record_dropped(1);
                    }
                },
            }
        }
    }
}
