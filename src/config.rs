use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::aggregate::Stat;

/// Top-level configuration for the telesink agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Collection and flush timing.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Outputs metrics are written to.
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    /// Built-in inputs.
    #[serde(default)]
    pub inputs: InputsConfig,
}

/// Collection and flush timing.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// How often inputs gather metrics. Default: 10s.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// How often outputs are flushed. Default: 10s.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Maximum metrics per write call. Default: 1000.
    #[serde(default = "default_metric_batch_size")]
    pub metric_batch_size: usize,

    /// Capacity of each plain output's flush buffer, and separately of the
    /// queue in front of it. A plain output holds at most twice this many
    /// metrics: up to this many waiting in its queue plus this many
    /// buffered for the next flush. Default: 10000.
    #[serde(default = "default_metric_buffer_limit")]
    pub metric_buffer_limit: usize,

    /// Value of the `host` tag added to every metric. Empty disables it.
    #[serde(default)]
    pub hostname: String,

    /// Tags added to every metric that does not already carry them.
    #[serde(default)]
    pub global_tags: HashMap<String, String>,
}

/// Concrete output implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    File,
    Discard,
}

/// One configured output.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output implementation.
    #[serde(rename = "type")]
    pub output_type: OutputType,

    /// Name used in logs. Defaults to the output type.
    #[serde(default)]
    pub name: String,

    /// File output options.
    #[serde(default)]
    pub file: FileOutputConfig,

    /// Aggregate metrics before writing instead of writing raw points.
    #[serde(default)]
    pub aggregate: Option<AggregateConfig>,
}

/// File output options.
#[derive(Debug, Clone, Deserialize)]
pub struct FileOutputConfig {
    /// Destination path; "-" writes to stdout. Default: "-".
    #[serde(default = "default_file_path")]
    pub path: String,
}

/// Aggregation options for an output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregateConfig {
    /// Statistics to emit per numeric field. Default: count, min, max,
    /// mean, s2, stdev.
    #[serde(default)]
    pub stats: Vec<Stat>,
}

/// Built-in inputs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub internal: InternalInputConfig,
}

/// Agent self-telemetry input.
#[derive(Debug, Clone, Deserialize)]
pub struct InternalInputConfig {
    /// Emit `internal_agent` metrics. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_metric_batch_size() -> usize {
    1000
}

fn default_metric_buffer_limit() -> usize {
    10_000
}

fn default_file_path() -> String {
    "-".to_string()
}

fn default_true() -> bool {
    true
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            agent: AgentConfig::default(),
            outputs: Vec::new(),
            inputs: InputsConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            flush_interval: default_flush_interval(),
            metric_batch_size: default_metric_batch_size(),
            metric_buffer_limit: default_metric_buffer_limit(),
            hostname: String::new(),
            global_tags: HashMap::new(),
        }
    }
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            path: default_file_path(),
        }
    }
}

impl Default for InternalInputConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl OutputConfig {
    /// Name used for logging: the configured name or the output type.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match self.output_type {
            OutputType::File => "file".to_string(),
            OutputType::Discard => "discard".to_string(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg = Self::from_yaml(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("decoding YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.agent.interval.is_zero() {
            bail!("agent.interval must be positive");
        }

        if self.agent.flush_interval.is_zero() {
            bail!("agent.flush_interval must be positive");
        }

        if self.agent.metric_batch_size == 0 {
            bail!("agent.metric_batch_size must be positive");
        }

        if self.agent.metric_batch_size > self.agent.metric_buffer_limit {
            bail!(
                "agent.metric_batch_size ({}) must not exceed agent.metric_buffer_limit ({})",
                self.agent.metric_batch_size,
                self.agent.metric_buffer_limit
            );
        }

        if self.outputs.is_empty() {
            bail!("at least one output is required");
        }

        let mut names = HashSet::new();
        for output in &self.outputs {
            let name = output.display_name();
            if !names.insert(name.clone()) {
                bail!("duplicate output name: {name} (set a unique name)");
            }

            if output.output_type == OutputType::File && output.file.path.is_empty() {
                bail!("output {name}: file.path must not be empty");
            }

            if let Some(aggregate) = &output.aggregate {
                let mut seen = HashSet::new();
                for stat in &aggregate.stats {
                    if !seen.insert(*stat) {
                        bail!("output {name}: stat {} listed twice", stat.as_str());
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            outputs: vec![OutputConfig {
                output_type: OutputType::Discard,
                name: String::new(),
                file: FileOutputConfig::default(),
                aggregate: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.agent.interval, Duration::from_secs(10));
        assert_eq!(cfg.agent.flush_interval, Duration::from_secs(10));
        assert_eq!(cfg.agent.metric_batch_size, 1000);
        assert_eq!(cfg.agent.metric_buffer_limit, 10_000);
        assert!(cfg.inputs.internal.enabled);
    }

    #[test]
    fn test_valid_config_passes() {
        valid_config().validate().expect("valid config");
    }

    #[test]
    fn test_no_outputs_rejected() {
        let cfg = Config::default();
        let err = cfg.validate().expect_err("must fail");
        assert!(err.to_string().contains("at least one output"));
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let mut cfg = valid_config();
        cfg.agent.flush_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_batch_size_above_buffer_limit_rejected() {
        let mut cfg = valid_config();
        cfg.agent.metric_batch_size = 500;
        cfg.agent.metric_buffer_limit = 100;
        let err = cfg.validate().expect_err("must fail");
        assert!(err.to_string().contains("metric_buffer_limit"));
    }

    #[test]
    fn test_duplicate_output_names_rejected() {
        let mut cfg = valid_config();
        cfg.outputs.push(cfg.outputs[0].clone());
        let err = cfg.validate().expect_err("must fail");
        assert!(err.to_string().contains("duplicate output name: discard"));
    }

    #[test]
    fn test_duplicate_stat_rejected() {
        let mut cfg = valid_config();
        cfg.outputs[0].aggregate = Some(AggregateConfig {
            stats: vec![Stat::Mean, Stat::Mean],
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
log_level: debug
agent:
  interval: 2s
  flush_interval: 500ms
  hostname: node-1
  global_tags:
    region: eu-west
outputs:
  - type: file
    name: stdout
    file:
      path: "-"
  - type: discard
    name: summaries
    aggregate:
      stats: [count, mean, max]
inputs:
  internal:
    enabled: false
"#;
        let cfg = Config::from_yaml(yaml).expect("parse");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.agent.interval, Duration::from_secs(2));
        assert_eq!(cfg.agent.flush_interval, Duration::from_millis(500));
        assert_eq!(cfg.agent.hostname, "node-1");
        assert_eq!(
            cfg.agent.global_tags.get("region").map(String::as_str),
            Some("eu-west")
        );
        assert_eq!(cfg.outputs.len(), 2);
        assert_eq!(cfg.outputs[0].output_type, OutputType::File);
        assert!(cfg.outputs[0].aggregate.is_none());
        let stats = &cfg.outputs[1]
            .aggregate
            .as_ref()
            .expect("aggregate section")
            .stats;
        assert_eq!(stats, &vec![Stat::Count, Stat::Mean, Stat::Max]);
        assert!(!cfg.inputs.internal.enabled);
    }

    #[test]
    fn test_parse_unknown_stat_fails() {
        let yaml = r#"
outputs:
  - type: discard
    aggregate:
      stats: [median]
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
