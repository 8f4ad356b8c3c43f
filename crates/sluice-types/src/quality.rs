//! Declarative quality checks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happens to a record that fails a check.
///
/// Variants are declared in ascending severity so that `Ord` yields the
/// governing action: `Fail > Warn > Quarantine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityAction {
    /// Exclude from the write and route to the dead-letter artifact.
    Quarantine,
    /// Write through, but log and count the failure.
    Warn,
    /// Abort the run.
    Fail,
}

impl QualityAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quarantine => "quarantine",
            Self::Warn => "warn",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for QualityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of check plus its parameters, tagged by `check` in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum CheckKind {
    NotNull,
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Regex {
        pattern: String,
    },
    InList {
        values: Vec<serde_json::Value>,
    },
    NotInList {
        values: Vec<serde_json::Value>,
    },
    Unique,
    /// Caller-registered predicate looked up by `name`.
    Custom {
        name: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl CheckKind {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::NotNull => "not_null",
            Self::Range { .. } => "range",
            Self::Regex { .. } => "regex",
            Self::InList { .. } => "in_list",
            Self::NotInList { .. } => "not_in_list",
            Self::Unique => "unique",
            Self::Custom { name, .. } => name,
        }
    }
}

/// One configured check on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub column: String,
    #[serde(flatten)]
    pub kind: CheckKind,
    pub action: QualityAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_fail_warn_quarantine() {
        assert!(QualityAction::Fail > QualityAction::Warn);
        assert!(QualityAction::Warn > QualityAction::Quarantine);
        let governing = [QualityAction::Quarantine, QualityAction::Warn]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(governing, QualityAction::Warn);
    }

    #[test]
    fn deserializes_flat_check_definitions() {
        let check: QualityCheck = serde_json::from_str(
            r#"{"column":"amount","check":"range","min":0,"max":10,"action":"warn"}"#,
        )
        .unwrap();
        assert_eq!(check.column, "amount");
        assert_eq!(check.action, QualityAction::Warn);
        assert_eq!(
            check.kind,
            CheckKind::Range {
                min: Some(0.0),
                max: Some(10.0)
            }
        );

        let check: QualityCheck =
            serde_json::from_str(r#"{"column":"id","check":"not_null","action":"fail"}"#).unwrap();
        assert_eq!(check.kind, CheckKind::NotNull);
    }

    #[test]
    fn custom_check_keeps_its_name() {
        let check: QualityCheck = serde_json::from_str(
            r#"{"column":"n","check":"custom","name":"is_even","action":"quarantine"}"#,
        )
        .unwrap();
        assert_eq!(check.kind.name(), "is_even");
    }
}
