//! Metric sources feeding the agent through a [`MetricRouter`](crate::agent::router::MetricRouter).

pub mod internal;
