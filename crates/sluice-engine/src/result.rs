//! Run and check result types.

use sluice_types::manifest::RunStatus;

use crate::schema::{CompatibilityReport, EvolutionPlan};

/// Record counts for one resource run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    /// Records pulled past the resume bound.
    pub records_read: u64,
    /// Records written, or simulated in a dry run.
    pub records_written: u64,
    /// Records withheld from the write: quarantined plus an aborting record.
    pub records_failed: u64,
    /// Records written through despite a `warn` failure.
    pub records_warned: u64,
    pub records_quarantined: u64,
    pub batches: u64,
    /// Attempts beyond the first, across connection tests and writes.
    pub retries: u64,
    /// Gaps found in an integer tracking column, when detection is on.
    pub tracking_gaps: u64,
}

impl RunCounts {
    /// Whether any record was warned or quarantined.
    #[must_use]
    pub fn has_quality_failures(&self) -> bool {
        self.records_warned > 0 || self.records_quarantined > 0
    }
}

/// Outcome of one resource.
#[derive(Debug, Clone)]
pub struct ResourceResult {
    pub run_id: String,
    pub resource: String,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub duration_secs: f64,
    /// Rendered fatal error, when the run failed.
    pub error: Option<String>,
    /// Machine-readable error kind matching `error`.
    pub error_kind: Option<&'static str>,
    /// Location of the flushed dead-letter artifact.
    pub dead_letter_location: Option<String>,
    pub schema_plan: Option<EvolutionPlan>,
    pub dry_run: bool,
}

impl ResourceResult {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

/// Outcome of a whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    /// In config order.
    pub resources: Vec<ResourceResult>,
    pub duration_secs: f64,
    pub parallelism: usize,
}

impl PipelineResult {
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.resources.iter().any(ResourceResult::is_failed)
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceResult> {
        self.resources.iter().find(|r| r.resource == name)
    }

    /// Counts summed across resources.
    #[must_use]
    pub fn totals(&self) -> RunCounts {
        self.resources.iter().fold(RunCounts::default(), |mut acc, r| {
            acc.records_read += r.counts.records_read;
            acc.records_written += r.counts.records_written;
            acc.records_failed += r.counts.records_failed;
            acc.records_warned += r.counts.records_warned;
            acc.records_quarantined += r.counts.records_quarantined;
            acc.batches += r.counts.batches;
            acc.retries += r.counts.retries;
            acc.tracking_gaps += r.counts.tracking_gaps;
            acc
        })
    }
}

/// Connectivity outcome for one side of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    Failed(String),
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Preflight report for one resource. Nothing is executed.
#[derive(Debug, Clone)]
pub struct ResourceCheck {
    pub resource: String,
    pub source: ConnectionStatus,
    pub destination: ConnectionStatus,
    /// `None` when schema management is disabled or there was nothing to compare.
    pub schema_report: Option<CompatibilityReport>,
    /// Rendered DDL that a real run would plan.
    pub planned_statements: Vec<String>,
    /// Schema or evolution problems found while checking.
    pub errors: Vec<String>,
}

impl ResourceCheck {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.source.is_ok()
            && self.destination.is_ok()
            && self.errors.is_empty()
            && self.schema_report.as_ref().map_or(true, CompatibilityReport::passes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub resources: Vec<ResourceCheck>,
}

impl CheckResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.resources.iter().all(ResourceCheck::passed)
    }
}
