use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sluice_types::quality::QualityCheck;
use sluice_types::value::Value;

use crate::coerce::CoercionConfig;
use crate::retry::RetryConfig;
use crate::schema::EvolutionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub sources: Vec<EndpointConfig>,
    #[serde(default)]
    pub destinations: Vec<EndpointConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl PipelineConfig {
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&EndpointConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn destination(&self, name: &str) -> Option<&EndpointConfig> {
        self.destinations.iter().find(|d| d.name == name)
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

fn default_parallelism() -> usize {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".sluice")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackendKind::default(),
            path: default_state_path(),
        }
    }
}

/// A named source or destination and its connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub tracking_column: Option<String>,
    #[serde(default = "default_true")]
    pub incremental: bool,
    #[serde(default)]
    pub checkpoint: bool,
    #[serde(default)]
    pub initial_value: Option<Value>,
    #[serde(default)]
    pub lookback_seconds: Option<u64>,
    /// Warn about holes in an integer tracking column after a run.
    #[serde(default)]
    pub detect_gaps: bool,
    #[serde(default)]
    pub quality_checks: Vec<QualityCheck>,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub coercion: CoercionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_batch_size() -> usize {
    1_000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

fn default_sample_size() -> usize {
    crate::schema::DEFAULT_SAMPLE_SIZE
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_size: default_sample_size(),
            strict: false,
            required_columns: Vec::new(),
            evolution: EvolutionConfig::default(),
        }
    }
}
