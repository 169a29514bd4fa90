pub mod aggregated;
pub mod stats;

use std::collections::BTreeMap;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::metric::{FieldValue, Metric, SeriesKey};
use crate::output::Aggregator;

use self::stats::FieldStats;

/// Statistic emitted for every aggregated numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Count,
    Min,
    Max,
    Sum,
    Mean,
    S2,
    Stdev,
    Last,
}

impl Stat {
    /// Suffix appended to the field name, e.g. `usage_mean`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::S2 => "s2",
            Self::Stdev => "stdev",
            Self::Last => "last",
        }
    }

    /// Statistics emitted when none are configured.
    pub fn defaults() -> Vec<Stat> {
        vec![
            Self::Count,
            Self::Min,
            Self::Max,
            Self::Mean,
            Self::S2,
            Self::Stdev,
        ]
    }

    fn value(self, stats: &FieldStats) -> Option<FieldValue> {
        match self {
            Self::Count => Some(FieldValue::UInt(stats.count())),
            Self::Min => Some(FieldValue::Float(stats.min())),
            Self::Max => Some(FieldValue::Float(stats.max())),
            Self::Sum => Some(FieldValue::Float(stats.sum())),
            Self::Mean => Some(FieldValue::Float(stats.mean())),
            Self::S2 => stats.variance().map(FieldValue::Float),
            Self::Stdev => stats.stdev().map(FieldValue::Float),
            Self::Last => Some(FieldValue::Float(stats.last())),
        }
    }
}

/// Accumulated statistics of one series within a period.
#[derive(Debug, Clone)]
struct SeriesStats {
    /// Timestamp of the first metric folded into this series.
    time: SystemTime,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldStats>,
}

/// All series seen during one aggregation period.
#[derive(Debug, Default)]
struct Period {
    series: BTreeMap<SeriesKey, SeriesStats>,
}

impl Period {
    fn fold(&mut self, metric: &Metric) {
        let mut numeric = metric
            .fields()
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|v| (k, v)))
            .peekable();

        // Metrics without numeric fields contribute nothing.
        if numeric.peek().is_none() {
            return;
        }

        let series = self
            .series
            .entry(metric.series_key())
            .or_insert_with(|| SeriesStats {
                time: metric.time(),
                tags: metric.tags().clone(),
                fields: BTreeMap::new(),
            });

        for (key, value) in numeric {
            match series.fields.get_mut(key.as_str()) {
                Some(stats) => stats.record(value),
                None => {
                    series.fields.insert(key.clone(), FieldStats::new(value));
                }
            }
        }
    }

    fn render(&self, stats: &[Stat]) -> Vec<Metric> {
        self.series
            .iter()
            .map(|(key, series)| {
                let fields = series.fields.iter().flat_map(|(field, field_stats)| {
                    stats.iter().filter_map(move |stat| {
                        stat.value(field_stats)
                            .map(|v| (format!("{field}_{}", stat.as_str()), v))
                    })
                });
                Metric::new(key.name.as_str(), series.tags.clone(), fields, series.time)
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    /// Period receiving new metrics.
    current: Period,
    /// Period captured by `push`, awaiting `reset`.
    sealed: Option<Period>,
}

/// Aggregator computing basic statistics per series and numeric field.
///
/// `push` seals the current period and returns its snapshot; metrics added
/// after that land in the next period, so nothing folded between `push` and
/// `reset` is lost or counted twice. `reset` discards the sealed period, or
/// the current one when nothing was pushed.
pub struct BasicStats {
    stats: Vec<Stat>,
    state: Mutex<State>,
}

impl BasicStats {
    /// Creates an aggregator emitting `stats`. An empty list selects
    /// [`Stat::defaults`].
    pub fn new(stats: &[Stat]) -> Self {
        let stats = if stats.is_empty() {
            Stat::defaults()
        } else {
            stats.to_vec()
        };
        Self {
            stats,
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for BasicStats {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl Aggregator for BasicStats {
    fn add(&self, metric: &Metric) {
        self.state.lock().current.fold(metric);
    }

    fn push(&self) -> Vec<Metric> {
        let mut state = self.state.lock();
        if state.sealed.is_none() {
            let current = std::mem::take(&mut state.current);
            state.sealed = Some(current);
        }
        state
            .sealed
            .as_ref()
            .map(|period| period.render(&self.stats))
            .unwrap_or_default()
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        if state.sealed.take().is_none() {
            state.current = Period::default();
        }
    }
}
