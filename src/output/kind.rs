use anyhow::Result;

use crate::config::{OutputConfig, OutputType};
use crate::metric::Metric;

use super::discard::DiscardOutput;
use super::file::FileOutput;
use super::Output;

/// Dispatches to the configured concrete output.
///
/// Uses enum dispatch rather than trait objects: `Output` returns opaque
/// futures and is not object safe.
pub enum OutputKind {
    File(FileOutput),
    Discard(DiscardOutput),
}

impl OutputKind {
    /// Builds the concrete output described by `cfg`.
    pub fn from_config(cfg: &OutputConfig) -> Self {
        match cfg.output_type {
            OutputType::File => Self::File(FileOutput::new(&cfg.file)),
            OutputType::Discard => Self::Discard(DiscardOutput::new()),
        }
    }
}

impl Output for OutputKind {
    fn name(&self) -> &str {
        match self {
            Self::File(o) => o.name(),
            Self::Discard(o) => o.name(),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::File(o) => o.connect().await,
            Self::Discard(o) => o.connect().await,
        }
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        match self {
            Self::File(o) => o.write(metrics).await,
            Self::Discard(o) => o.write(metrics).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::File(o) => o.close().await,
            Self::Discard(o) => o.close().await,
        }
    }
}
