//! Value coercion against a target schema, applied to gated records right
//! before they are written.
//!
//! A lenient coercer leaves values it cannot convert untouched. A strict one
//! rejects the whole record, which the orchestrator dead-letters.

use serde::{Deserialize, Serialize};
use sluice_types::record::Record;
use sluice_types::schema::{DataType, Schema};
use sluice_types::value::{parse_iso_date, parse_iso_datetime, Value};

/// Coercion settings as they appear in resource config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoercionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strict: bool,
    /// Strings read as null, compared case-insensitively after trimming.
    /// The empty string is always null.
    #[serde(default = "default_null_values")]
    pub null_values: Vec<String>,
}

fn default_null_values() -> Vec<String> {
    ["null", "none", "n/a", "na", "nan"].map(String::from).to_vec()
}

impl Default for CoercionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strict: false,
            null_values: default_null_values(),
        }
    }
}

/// A value that could not be converted to its column's type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot coerce {found} value '{value}' in column '{column}' to {target}")]
pub struct CoercionError {
    pub column: String,
    pub value: String,
    pub found: &'static str,
    pub target: DataType,
}

#[derive(Debug, Clone)]
pub struct Coercer {
    schema: Schema,
    strict: bool,
    null_values: Vec<String>,
}

impl Coercer {
    #[must_use]
    pub fn new(config: &CoercionConfig, schema: Schema) -> Self {
        Self {
            schema,
            strict: config.strict,
            null_values: config.null_values.iter().map(|v| v.trim().to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    fn is_null_marker(&self, s: &str) -> bool {
        let s = s.trim();
        s.is_empty() || self.null_values.iter().any(|marker| marker.eq_ignore_ascii_case(s))
    }

    /// Convert `value` to `target`, or `None` when it does not fit.
    #[must_use]
    pub fn coerce_value(&self, value: &Value, target: DataType) -> Option<Value> {
        if let Value::String(s) = value {
            if self.is_null_marker(s) {
                return Some(Value::Null);
            }
        }
        if value.is_null() {
            return Some(Value::Null);
        }
        match target {
            DataType::String => Some(match value {
                Value::String(_) => value.clone(),
                other => Value::String(other.to_string()),
            }),
            DataType::Integer => to_integer(value).map(Value::Int),
            DataType::Float => to_float(value).map(Value::Float),
            DataType::Boolean => to_bool(value).map(Value::Bool),
            DataType::Date => match value {
                Value::Date(d) => Some(Value::Date(*d)),
                Value::DateTime(dt) if dt.time() == chrono::NaiveTime::MIN => Some(Value::Date(dt.date())),
                Value::String(s) => parse_iso_date(s.trim()).map(Value::Date),
                _ => None,
            },
            DataType::Datetime => match value {
                Value::Date(_) | Value::DateTime(_) => value.as_datetime().map(Value::DateTime),
                Value::String(s) => {
                    let s = s.trim();
                    parse_iso_datetime(s)
                        .or_else(|| parse_iso_date(s).map(|d| d.and_time(chrono::NaiveTime::MIN)))
                        .map(Value::DateTime)
                }
                _ => None,
            },
        }
    }

    /// Coerce every column the schema knows. Unknown columns pass through.
    ///
    /// # Errors
    ///
    /// In strict mode, returns the first value that cannot be converted.
    pub fn coerce_record(&self, record: &Record) -> Result<Record, CoercionError> {
        record
            .iter()
            .map(|(column, value)| {
                let Some(target) = self.schema.column(column).map(|c| c.data_type) else {
                    return Ok((column, value.clone()));
                };
                match self.coerce_value(value, target) {
                    Some(coerced) => Ok((column, coerced)),
                    None if self.strict => Err(CoercionError {
                        column: column.to_owned(),
                        value: value.to_string(),
                        found: value.type_name(),
                        target,
                    }),
                    None => {
                        tracing::debug!(column, value = %value, %target, "Value left uncoerced");
                        Ok((column, value.clone()))
                    }
                }
            })
            .collect()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| to_integer(&Value::Float(s.parse::<f64>().ok()?)))
        }
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::String(_) => value.as_f64(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
