use anyhow::Result;

use crate::metric::Metric;

use super::Output;

/// Output that accepts every batch and drops it.
#[derive(Debug, Default)]
pub struct DiscardOutput {
    discarded: u64,
}

impl DiscardOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total metrics accepted so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Output for DiscardOutput {
    fn name(&self) -> &str {
        "discard"
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        self.discarded += metrics.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
