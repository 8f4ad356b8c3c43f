//! Compiled quality checks and the custom-check registry.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use sluice_types::quality::{CheckKind, QualityAction, QualityCheck};
use sluice_types::value::Value;

use crate::errors::PipelineError;

/// Caller-supplied predicate: `(value, params) -> passes`.
pub type CustomCheckFn = Arc<dyn Fn(&Value, &serde_json::Value) -> bool + Send + Sync>;

/// Named custom checks, built once and shared read-only.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: HashMap<String, CustomCheckFn>,
}

impl CheckRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &serde_json::Value) -> bool + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(check));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CustomCheckFn> {
        self.checks.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("CheckRegistry").field("checks", &names).finish()
    }
}

pub(crate) enum Rule {
    NotNull,
    Range { min: Option<f64>, max: Option<f64> },
    Regex { pattern: String, regex: Regex },
    InList(Vec<Value>),
    NotInList(Vec<Value>),
    Unique,
    Custom { name: String, params: serde_json::Value, check: CustomCheckFn },
}

pub(crate) struct CompiledCheck {
    pub column: String,
    pub action: QualityAction,
    pub rule: Rule,
}

impl CompiledCheck {
    /// Resolve regexes and custom names up front so that a bad definition
    /// fails before any record is read.
    pub fn compile(check: &QualityCheck, registry: &CheckRegistry) -> Result<Self, PipelineError> {
        let rule = match &check.kind {
            CheckKind::NotNull => Rule::NotNull,
            CheckKind::Range { min, max } => Rule::Range { min: *min, max: *max },
            CheckKind::Regex { pattern } => {
                let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    PipelineError::Configuration(format!(
                        "invalid regex for column '{}': {e}",
                        check.column
                    ))
                })?;
                Rule::Regex { pattern: pattern.clone(), regex }
            }
            CheckKind::InList { values } => {
                Rule::InList(values.iter().cloned().map(Value::from).collect())
            }
            CheckKind::NotInList { values } => {
                Rule::NotInList(values.iter().cloned().map(Value::from).collect())
            }
            CheckKind::Unique => Rule::Unique,
            CheckKind::Custom { name, params } => {
                let check_fn = registry.get(name).cloned().ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "unknown custom check '{name}' on column '{}'",
                        check.column
                    ))
                })?;
                Rule::Custom {
                    name: name.clone(),
                    params: params.clone(),
                    check: check_fn,
                }
            }
        };
        Ok(Self {
            column: check.column.clone(),
            action: check.action,
            rule,
        })
    }

    pub fn name(&self) -> &str {
        match &self.rule {
            Rule::NotNull => "not_null",
            Rule::Range { .. } => "range",
            Rule::Regex { .. } => "regex",
            Rule::InList(_) => "in_list",
            Rule::NotInList(_) => "not_in_list",
            Rule::Unique => "unique",
            Rule::Custom { name, .. } => name,
        }
    }

    /// Evaluate against one value. `seen` is this check's batch-local
    /// unique set. Returns the failure reason, if any.
    pub fn evaluate(&self, value: &Value, seen: &mut std::collections::HashSet<String>) -> Option<String> {
        let column = &self.column;
        let reason = match &self.rule {
            Rule::NotNull => value
                .is_null_or_empty()
                .then(|| "value is null or empty".to_owned()),
            Rule::Range { min, max } => match value.as_f64() {
                None => Some(format!("value {value} is not numeric")),
                Some(n) if min.is_some_and(|lo| n < lo) || max.is_some_and(|hi| n > hi) => {
                    Some(format!("value {n} outside bounds [{}, {}]", bound(*min), bound(*max)))
                }
                Some(_) => None,
            },
            Rule::Regex { pattern, regex } => match value {
                Value::String(s) if regex.is_match(s) => None,
                Value::String(s) => Some(format!("value '{s}' does not match /{pattern}/")),
                other => Some(format!("{} value is not a string", other.type_name())),
            },
            Rule::InList(allowed) => (!allowed.iter().any(|a| a.loosely_equals(value)))
                .then(|| format!("value {value} not in allowed list")),
            Rule::NotInList(denied) => denied
                .iter()
                .any(|d| d.loosely_equals(value))
                .then(|| format!("value {value} is in denied list")),
            Rule::Unique => {
                if value.is_null() {
                    None
                } else {
                    let key = format!("{}:{value}", value.type_name());
                    (!seen.insert(key)).then(|| format!("duplicate value {value} in batch"))
                }
            }
            Rule::Custom { params, check, .. } => {
                (!check(value, params)).then(|| format!("value {value} rejected"))
            }
        };
        reason.map(|r| format!("{}({column}) failed: {r}", self.name()))
    }
}

fn bound(b: Option<f64>) -> String {
    b.map_or_else(|| "-".to_owned(), |v| v.to_string())
}
