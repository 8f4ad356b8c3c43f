//! Semantic validation for parsed pipeline configuration values.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use regex::Regex;
use sluice_state::checkpoint::sanitize;
use sluice_types::quality::{CheckKind, QualityCheck};

use crate::config::types::{EndpointConfig, PipelineConfig, ResourceConfig};

fn validate_names<'a>(
    names: impl Iterator<Item = &'a str>,
    context: &str,
    errors: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for (i, name) in names.enumerate() {
        if name.trim().is_empty() {
            errors.push(format!("{context} {i} has an empty name"));
        } else if !seen.insert(name) {
            errors.push(format!("Duplicate {context} name '{name}'"));
        }
    }
}

/// Resource names key checkpoint and dead-letter files; two names that
/// sanitize to the same file name would share state.
fn validate_storage_names(resources: &[ResourceConfig], errors: &mut Vec<String>) {
    let mut files: HashMap<String, &str> = HashMap::new();
    for resource in resources {
        match files.entry(sanitize(&resource.name)) {
            Entry::Occupied(taken) if *taken.get() != resource.name => errors.push(format!(
                "Resource names '{}' and '{}' map to the same state file '{}'",
                taken.get(),
                resource.name,
                taken.key()
            )),
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(&resource.name);
            }
        }
    }
}

fn validate_endpoints(endpoints: &[EndpointConfig], context: &str, errors: &mut Vec<String>) {
    validate_names(endpoints.iter().map(|e| e.name.as_str()), context, errors);
    for endpoint in endpoints {
        if endpoint.kind.trim().is_empty() {
            errors.push(format!("{context} '{}' has an empty type", endpoint.name));
        }
    }
}

fn validate_check(resource: &str, i: usize, check: &QualityCheck, errors: &mut Vec<String>) {
    let context = format!("Resource '{resource}' quality_checks[{i}]");
    if check.column.trim().is_empty() {
        errors.push(format!("{context}: column must not be empty"));
    }
    match &check.kind {
        CheckKind::Range { min: None, max: None } => {
            errors.push(format!("{context}: range check needs min or max"));
        }
        CheckKind::Range { min: Some(lo), max: Some(hi) } if lo > hi => {
            errors.push(format!("{context}: range min {lo} exceeds max {hi}"));
        }
        CheckKind::Regex { pattern } => {
            if let Err(e) = Regex::new(pattern) {
                errors.push(format!("{context}: invalid regex '{pattern}': {e}"));
            }
        }
        CheckKind::InList { values } | CheckKind::NotInList { values } if values.is_empty() => {
            errors.push(format!("{context}: {} check needs at least one value", check.kind.name()));
        }
        CheckKind::Custom { name, .. } if name.trim().is_empty() => {
            errors.push(format!("{context}: custom check needs a name"));
        }
        _ => {}
    }
}

fn validate_resource(config: &PipelineConfig, resource: &ResourceConfig, errors: &mut Vec<String>) {
    let name = &resource.name;

    if config.source(&resource.source).is_none() {
        errors.push(format!(
            "Resource '{name}' references unknown source '{}'",
            resource.source
        ));
    }
    if config.destination(&resource.destination).is_none() {
        errors.push(format!(
            "Resource '{name}' references unknown destination '{}'",
            resource.destination
        ));
    }

    if resource.batch_size == 0 {
        errors.push(format!("Resource '{name}': batch_size must be at least 1"));
    }

    if resource.tracking_column.is_none() {
        if resource.checkpoint {
            errors.push(format!(
                "Resource '{name}' enables checkpoint but has no tracking_column"
            ));
        }
        if resource.lookback_seconds.is_some() {
            errors.push(format!(
                "Resource '{name}' sets lookback_seconds but has no tracking_column"
            ));
        }
        if resource.initial_value.is_some() {
            errors.push(format!(
                "Resource '{name}' sets initial_value but has no tracking_column"
            ));
        }
        if resource.detect_gaps {
            errors.push(format!(
                "Resource '{name}' enables detect_gaps but has no tracking_column"
            ));
        }
    }

    if resource.retry.max_attempts == 0 {
        errors.push(format!("Resource '{name}': retry.max_attempts must be at least 1"));
    }
    if resource.retry.factor.is_nan() || resource.retry.factor < 1.0 {
        errors.push(format!("Resource '{name}': retry.factor must be at least 1.0"));
    }

    if resource.schema.sample_size == 0 {
        errors.push(format!("Resource '{name}': schema.sample_size must be at least 1"));
    }

    for (i, check) in resource.quality_checks.iter().enumerate() {
        validate_check(name, i, check, errors);
    }
}

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the pipeline config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.parallelism == 0 {
        errors.push("parallelism must be at least 1".to_string());
    }

    validate_endpoints(&config.sources, "Source", &mut errors);
    validate_endpoints(&config.destinations, "Destination", &mut errors);

    if config.resources.is_empty() {
        errors.push("Pipeline must define at least one resource".to_string());
    }
    validate_names(
        config.resources.iter().map(|r| r.name.as_str()),
        "Resource",
        &mut errors,
    );
    validate_storage_names(&config.resources, &mut errors);
    for resource in &config.resources {
        validate_resource(config, resource, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}
