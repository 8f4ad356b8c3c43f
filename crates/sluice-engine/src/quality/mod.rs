//! Per-record data quality checks with quarantine, warn and fail dispositions.

mod checks;

pub use checks::{CheckRegistry, CustomCheckFn};

use std::collections::HashSet;

use sluice_types::quality::{QualityAction, QualityCheck};
use sluice_types::record::Record;

use checks::CompiledCheck;

use crate::errors::PipelineError;

/// A record that failed at least one check.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRecord {
    /// 1-based position across the whole run.
    pub row_number: u64,
    pub record: Record,
    pub failures: Vec<String>,
    /// The most severe action among the failed checks.
    pub action: QualityAction,
}

impl InvalidRecord {
    /// All failure reasons joined with `"; "`.
    #[must_use]
    pub fn message(&self) -> String {
        self.failures.join("; ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Records to write: passing records plus warned ones.
    pub valid_records: Vec<Record>,
    pub invalid_records: Vec<InvalidRecord>,
}

impl BatchResult {
    /// The record whose `fail` action aborts the run. Evaluation stops there.
    #[must_use]
    pub fn failure(&self) -> Option<&InvalidRecord> {
        self.invalid_records
            .iter()
            .find(|r| r.action == QualityAction::Fail)
    }

    /// Row numbers of `valid_records`, in order, for a batch that started at
    /// `first_row_number` and did not abort.
    #[must_use]
    pub fn valid_row_numbers(&self, first_row_number: u64) -> Vec<u64> {
        let withheld: HashSet<u64> = self
            .invalid_records
            .iter()
            .filter(|r| r.action != QualityAction::Warn)
            .map(|r| r.row_number)
            .collect();
        (first_row_number..)
            .filter(|n| !withheld.contains(n))
            .take(self.valid_records.len())
            .collect()
    }

    pub fn quarantined(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.with_action(QualityAction::Quarantine)
    }

    pub fn warned(&self) -> impl Iterator<Item = &InvalidRecord> {
        self.with_action(QualityAction::Warn)
    }

    fn with_action(&self, action: QualityAction) -> impl Iterator<Item = &InvalidRecord> {
        self.invalid_records.iter().filter(move |r| r.action == action)
    }
}

pub struct QualityGate {
    checks: Vec<CompiledCheck>,
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl QualityGate {
    /// Compile `checks` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for an invalid regex or an
    /// unregistered custom check name.
    pub fn new(checks: &[QualityCheck], registry: &CheckRegistry) -> Result<Self, PipelineError> {
        let checks = checks
            .iter()
            .map(|c| CompiledCheck::compile(c, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { checks })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluate one batch. `first_row_number` is the run-wide number of the
    /// first record in `records`. Uniqueness is tracked for this batch only.
    #[must_use]
    pub fn validate_batch(&self, records: Vec<Record>, first_row_number: u64) -> BatchResult {
        let mut result = BatchResult::default();
        if self.checks.is_empty() {
            result.valid_records = records;
            return result;
        }

        let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); self.checks.len()];

        for (row_number, record) in (first_row_number..).zip(records) {
            let mut failures = Vec::new();
            let mut governing: Option<QualityAction> = None;

            for (check, seen) in self.checks.iter().zip(seen.iter_mut()) {
                let Some(value) = record.get(&check.column) else {
                    continue;
                };
                if let Some(reason) = check.evaluate(value, seen) {
                    tracing::debug!(row = row_number, check = check.name(), %reason, "Quality check failed");
                    failures.push(reason);
                    governing = governing.max(Some(check.action));
                }
            }

            let Some(action) = governing else {
                result.valid_records.push(record);
                continue;
            };

            match action {
                QualityAction::Warn => {
                    tracing::warn!(row = row_number, failures = %failures.join("; "), "Record failed quality checks; writing anyway");
                    result.valid_records.push(record.clone());
                }
                QualityAction::Quarantine => {
                    tracing::debug!(row = row_number, "Record quarantined");
                }
                QualityAction::Fail => {}
            }
            result.invalid_records.push(InvalidRecord {
                row_number,
                record,
                failures,
                action,
            });
            if action == QualityAction::Fail {
                break;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_types::quality::CheckKind;
    use sluice_types::value::Value;

    fn check(column: &str, kind: CheckKind, action: QualityAction) -> QualityCheck {
        QualityCheck {
            column: column.into(),
            kind,
            action,
        }
    }

    fn gate(checks: &[QualityCheck]) -> QualityGate {
        QualityGate::new(checks, &CheckRegistry::new()).unwrap()
    }

    fn rows(ids: &[Option<i64>]) -> Vec<Record> {
        ids.iter()
            .map(|id| Record::new().with("id", Value::from(*id)))
            .collect()
    }

    #[test]
    fn all_pass_without_checks() {
        let result = gate(&[]).validate_batch(rows(&[Some(1), None]), 1);
        assert_eq!(result.valid_records.len(), 2);
        assert!(result.invalid_records.is_empty());
    }

    #[test]
    fn quarantine_excludes_record_and_keeps_row_number() {
        let g = gate(&[check("id", CheckKind::NotNull, QualityAction::Quarantine)]);
        let result = g.validate_batch(rows(&[Some(1), Some(2), None]), 11);
        assert_eq!(result.valid_records.len(), 2);
        let bad: Vec<_> = result.quarantined().collect();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].row_number, 13);
        assert!(result.failure().is_none());
    }

    #[test]
    fn valid_row_numbers_skip_withheld_rows() {
        let g = gate(&[
            check("id", CheckKind::NotNull, QualityAction::Quarantine),
            check("score", CheckKind::Range { min: Some(0.0), max: Some(10.0) }, QualityAction::Warn),
        ]);
        let records = vec![
            Record::new().with("id", 1).with("score", 5),
            Record::new().with("id", Value::Null).with("score", 5),
            Record::new().with("id", 3).with("score", 50),
            Record::new().with("id", Value::Null).with("score", 1),
            Record::new().with("id", 5).with("score", 2),
        ];
        let result = g.validate_batch(records, 21);
        assert_eq!(result.warned().count(), 1);
        assert_eq!(result.valid_row_numbers(21), vec![21, 23, 25]);
        assert_eq!(result.valid_records.len(), 3);
    }

    #[test]
    fn warn_writes_record_through() {
        let g = gate(&[check("id", CheckKind::NotNull, QualityAction::Warn)]);
        let result = g.validate_batch(rows(&[None, Some(1)]), 1);
        assert_eq!(result.valid_records.len(), 2);
        assert_eq!(result.warned().count(), 1);
    }

    #[test]
    fn fail_stops_evaluation_at_offending_record() {
        let g = gate(&[check("id", CheckKind::NotNull, QualityAction::Fail)]);
        let result = g.validate_batch(rows(&[Some(1), Some(2), None, Some(4)]), 1);
        let failure = result.failure().unwrap();
        assert_eq!(failure.row_number, 3);
        assert_eq!(result.valid_records.len(), 2);
    }

    #[test]
    fn most_severe_action_governs() {
        let g = gate(&[
            check("id", CheckKind::NotNull, QualityAction::Quarantine),
            check("id", CheckKind::Range { min: Some(0.0), max: None }, QualityAction::Warn),
        ]);
        let result = g.validate_batch(rows(&[None]), 1);
        let bad = &result.invalid_records[0];
        assert_eq!(bad.action, QualityAction::Warn);
        assert_eq!(bad.failures.len(), 2);
        assert_eq!(
            bad.message(),
            "not_null(id) failed: value is null or empty; range(id) failed: value null is not numeric"
        );
        assert_eq!(result.valid_records.len(), 1);
    }

    #[test]
    fn checks_on_absent_columns_are_skipped() {
        let g = gate(&[check("email", CheckKind::NotNull, QualityAction::Fail)]);
        let result = g.validate_batch(rows(&[Some(1)]), 1);
        assert!(result.invalid_records.is_empty());
    }

    #[test]
    fn unique_resets_between_batches() {
        let g = gate(&[check("id", CheckKind::Unique, QualityAction::Quarantine)]);
        let first = g.validate_batch(rows(&[Some(1), Some(1)]), 1);
        assert_eq!(first.quarantined().count(), 1);
        let second = g.validate_batch(rows(&[Some(1)]), 3);
        assert!(second.invalid_records.is_empty());
    }
}
