use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free agent-wide counters shared by the collection and flush paths.
pub struct AgentStats {
    metrics_gathered: AtomicU64,
    metrics_written: AtomicU64,
    metrics_dropped: AtomicU64,
    write_errors: AtomicU64,
}

/// Point-in-time view of [`AgentStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStatsSnapshot {
    pub metrics_gathered: u64,
    pub metrics_written: u64,
    pub metrics_dropped: u64,
    pub write_errors: u64,
}

impl AgentStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self {
            metrics_gathered: AtomicU64::new(0),
            metrics_written: AtomicU64::new(0),
            metrics_dropped: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    pub fn record_gathered(&self, n: u64) {
        self.metrics_gathered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_written(&self, n: u64) {
        self.metrics_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, n: u64) {
        if n > 0 {
            self.metrics_dropped.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters. Counters are cumulative and never reset.
    pub fn snapshot(&self) -> AgentStatsSnapshot {
        AgentStatsSnapshot {
            metrics_gathered: self.metrics_gathered.load(Ordering::Relaxed),
            metrics_written: self.metrics_written.load(Ordering::Relaxed),
            metrics_dropped: self.metrics_dropped.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for AgentStats {
    fn default() -> Self {
        Self::new()
    }
}
