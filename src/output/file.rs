use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::FileOutputConfig;
use crate::metric::{FieldValue, Metric};

use super::Output;

/// JSON line written for each metric.
#[derive(Debug, Serialize)]
struct MetricJson<'a> {
    name: &'a str,
    timestamp: String,
    tags: &'a BTreeMap<String, String>,
    fields: &'a BTreeMap<String, FieldValue>,
}

/// Newline-delimited JSON output to a file or stdout.
///
/// Each batch is serialized in full before anything reaches the writer, so a
/// serialization error never leaves a partial batch behind.
pub struct FileOutput {
    path: Option<PathBuf>,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    buf: Vec<u8>,
}

impl FileOutput {
    /// Creates a file output from config. A path of `-` writes to stdout.
    pub fn new(cfg: &FileOutputConfig) -> Self {
        let path = if cfg.path == "-" {
            None
        } else {
            Some(PathBuf::from(&cfg.path))
        };
        Self {
            path,
            writer: None,
            buf: Vec::new(),
        }
    }
}

impl Output for FileOutput {
    fn name(&self) -> &str {
        "file"
    }

    async fn connect(&mut self) -> Result<()> {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = match &self.path {
            Some(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                Box::new(file)
            }
            None => Box::new(tokio::io::stdout()),
        };

        self.writer = Some(writer);
        Ok(())
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("file output is not connected");
        };

        self.buf.clear();
        for metric in metrics.iter() {
            let line = MetricJson {
                name: metric.name(),
                timestamp: format_timestamp(metric.time()),
                tags: metric.tags(),
                fields: metric.fields(),
            };
            serde_json::to_writer(&mut self.buf, &line).context("serializing metric to JSON")?;
            self.buf.push(b'\n');
        }

        writer
            .write_all(&self.buf)
            .await
            .context("writing metrics")?;
        writer.flush().await.context("flushing metrics")?;

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await.context("flushing on close")?;
            writer.shutdown().await.context("shutting down writer")?;
        }
        Ok(())
    }
}

/// Formats a timestamp as RFC 3339 UTC with nanosecond precision.
fn format_timestamp(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
