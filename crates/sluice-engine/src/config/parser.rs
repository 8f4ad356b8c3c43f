//! Pipeline YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::PipelineConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            missing.push(cap[1].to_owned());
            String::new()
        })
    });

    if !missing.is_empty() {
        missing.dedup();
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a pipeline YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_pipeline_str(yaml_str: &str) -> Result<PipelineConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: PipelineConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse pipeline YAML")?;
    Ok(config)
}

/// Parse a pipeline YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_pipeline(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    parse_pipeline_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_set_variables() {
        std::env::set_var("SLUICE_TEST_DATA_DIR", "/var/data");
        let result = substitute_env_vars("path: ${SLUICE_TEST_DATA_DIR}/orders.jsonl").unwrap();
        assert_eq!(result, "path: /var/data/orders.jsonl");
        std::env::remove_var("SLUICE_TEST_DATA_DIR");
    }

    #[test]
    fn text_without_references_passes_through() {
        let input = "batch_size: 10\nquery: \"$notavar\"";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn every_missing_variable_is_named() {
        let err = substitute_env_vars("${SLUICE_MISSING_X} and ${SLUICE_MISSING_Y}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("SLUICE_MISSING_X"));
        assert!(err.contains("SLUICE_MISSING_Y"));
    }

    #[test]
    fn parses_pipeline_with_substitution() {
        std::env::set_var("SLUICE_TEST_OUT", "out/users.jsonl");
        let yaml = r#"
version: "1.0"
sources: [{ name: src, type: memory, config: { records: [] } }]
destinations: [{ name: dst, type: jsonl, config: { path: "${SLUICE_TEST_OUT}" } }]
resources: [{ name: users, source: src, destination: dst }]
"#;
        let config = parse_pipeline_str(yaml).unwrap();
        assert_eq!(config.destinations[0].config["path"], "out/users.jsonl");
        std::env::remove_var("SLUICE_TEST_OUT");
    }

    #[test]
    fn invalid_yaml_errors() {
        assert!(parse_pipeline_str("this is not: [valid: yaml: {{{}}}").is_err());
    }

    #[test]
    fn missing_file_errors_with_path() {
        let err = parse_pipeline(Path::new("/nonexistent/pipeline.yaml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read pipeline file"));
    }
}
