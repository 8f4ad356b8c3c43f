//! Source/destination schema compatibility checks.

use std::fmt;

use sluice_types::schema::{DataType, Schema};

use super::{classify, TypeCompatibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// A required column the source does not provide.
    MissingRequiredColumn,
    /// A destination column the source does not provide.
    ExtraDestinationColumn,
    TypeNarrowing { source: DataType, destination: DataType },
    TypeMismatch { source: DataType, destination: DataType },
    /// Nullable source column feeding a NOT NULL destination column.
    NullabilityViolation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub column: String,
    pub severity: Severity,
    pub kind: IssueKind,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = &self.column;
        match &self.kind {
            IssueKind::MissingRequiredColumn => {
                write!(f, "required column '{column}' is missing from the source")
            }
            IssueKind::ExtraDestinationColumn => {
                write!(f, "column '{column}' exists only in the destination")
            }
            IssueKind::TypeNarrowing { source, destination } => write!(
                f,
                "column '{column}' narrows from {source} to {destination}; values may not fit"
            ),
            IssueKind::TypeMismatch { source, destination } => write!(
                f,
                "column '{column}' has incompatible types: source {source}, destination {destination}"
            ),
            IssueKind::NullabilityViolation => write!(
                f,
                "column '{column}' is nullable in the source but NOT NULL in the destination"
            ),
        }
    }
}

/// Outcome of [`SchemaValidator::compare`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityReport {
    pub issues: Vec<SchemaIssue>,
    pub strict: bool,
}

impl CompatibilityReport {
    pub fn errors(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SchemaIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// Overall verdict. Strict mode lets warnings fail the report while they
    /// keep their `Warning` label.
    #[must_use]
    pub fn passes(&self) -> bool {
        !self.has_errors() && !(self.strict && self.has_warnings())
    }

    /// Drop type issues on columns about to be retyped. Nullability and
    /// missing-column issues survive, since a type change fixes neither.
    pub fn discount_type_issues(&mut self, columns: &[&str]) {
        self.issues.retain(|i| {
            let retyped = matches!(i.kind, IssueKind::TypeNarrowing { .. } | IssueKind::TypeMismatch { .. });
            !(retyped && columns.contains(&i.column.as_str()))
        });
    }

    /// One line per failing issue, for error messages.
    #[must_use]
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error || self.strict)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    pub strict: bool,
}

impl SchemaValidator {
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Compare every column across the union of both schemas.
    #[must_use]
    pub fn compare(
        &self,
        source: &Schema,
        destination: &Schema,
        required_columns: &[String],
    ) -> CompatibilityReport {
        let mut issues = Vec::new();
        let mut push = |column: &str, severity, kind| {
            issues.push(SchemaIssue {
                column: column.to_owned(),
                severity,
                kind,
            });
        };

        for required in required_columns {
            if source.column(required).is_none() {
                push(required, Severity::Error, IssueKind::MissingRequiredColumn);
            }
        }

        for dest_col in destination.columns() {
            let Some(src_col) = source.column(&dest_col.name) else {
                if !required_columns.contains(&dest_col.name) {
                    push(&dest_col.name, Severity::Warning, IssueKind::ExtraDestinationColumn);
                }
                continue;
            };

            let (from, to) = (src_col.data_type, dest_col.data_type);
            match classify(from, to) {
                TypeCompatibility::Identical | TypeCompatibility::Widening => {}
                TypeCompatibility::Narrowing => push(
                    &dest_col.name,
                    Severity::Warning,
                    IssueKind::TypeNarrowing { source: from, destination: to },
                ),
                TypeCompatibility::Incompatible => push(
                    &dest_col.name,
                    Severity::Error,
                    IssueKind::TypeMismatch { source: from, destination: to },
                ),
            }

            if src_col.nullable && !dest_col.nullable {
                push(&dest_col.name, Severity::Error, IssueKind::NullabilityViolation);
            }
        }

        CompatibilityReport {
            issues,
            strict: self.strict,
        }
    }
}
