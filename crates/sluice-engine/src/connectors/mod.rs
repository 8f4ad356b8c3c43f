//! Built-in connectors.

pub mod jsonl;
pub mod memory;

use serde::{Deserialize, Serialize};
use sluice_types::error::ConnectorError;

pub use jsonl::{JsonlDestination, JsonlSource};
pub use memory::{MemoryDestination, MemorySource, MemoryTable};

/// How a destination treats content that predates the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    /// Truncate on the first write of a run.
    Replace,
}

/// Deserialize a connector's `config` block, mapping failures to a
/// config-category error. A missing block deserializes from `{}`.
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    kind: &str,
    config: &serde_json::Value,
) -> Result<T, ConnectorError> {
    let value = if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| ConnectorError::config("INVALID_CONFIG", format!("{kind} config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default)]
        write_mode: WriteMode,
    }

    #[test]
    fn null_config_uses_defaults() {
        let parsed: Sample = parse_config("memory", &serde_json::Value::Null).unwrap();
        assert_eq!(parsed.write_mode, WriteMode::Append);
    }

    #[test]
    fn bad_config_is_config_category() {
        let err = parse_config::<Sample>("jsonl", &serde_json::json!({"write_mode": "upsert"}))
            .unwrap_err();
        assert_eq!(err.category, sluice_types::error::ErrorCategory::Config);
        assert!(err.message.starts_with("jsonl config:"));
    }
}
