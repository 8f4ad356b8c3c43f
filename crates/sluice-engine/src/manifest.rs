//! Run timing and the manifest entry written at the end of every run.

use std::time::Instant;

use chrono::{DateTime, Utc};
use sluice_state::StateBackend;
use sluice_types::manifest::{ManifestEntry, RunStatus};
use sluice_types::state::PipelineId;

use crate::errors::PipelineError;
use crate::result::RunCounts;

/// Message recorded when a run unwinds without reaching a terminal state.
pub const ABORTED_MESSAGE: &str = "run aborted before completion";

/// Outputs of a run that its manifest entry points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArtifacts {
    /// Location of the flushed dead-letter file.
    pub dead_letter: Option<String>,
    /// Rendered DDL planned (or applied) during preflight.
    pub schema_statements: Vec<String>,
}

/// Scoped guard for one resource run.
///
/// Call [`RunTracker::complete`] on every terminal path. If the guard is
/// dropped first (a panic unwinding through the orchestrator), it appends a
/// `failed` entry itself.
pub struct RunTracker<'a> {
    backend: &'a dyn StateBackend,
    run_id: String,
    pipeline: PipelineId,
    source_kind: String,
    destination_kind: String,
    started_at: DateTime<Utc>,
    started: Instant,
    dry_run: bool,
    finished: bool,
}

impl<'a> RunTracker<'a> {
    #[must_use]
    pub fn start(
        backend: &'a dyn StateBackend,
        pipeline: PipelineId,
        source_kind: impl Into<String>,
        destination_kind: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            backend,
            run_id: uuid::Uuid::new_v4().to_string(),
            pipeline,
            source_kind: source_kind.into(),
            destination_kind: destination_kind.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            dry_run,
            finished: false,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Append the terminal entry. A failed append is logged, not returned:
    /// the run's own outcome stands.
    pub fn complete(
        mut self,
        status: RunStatus,
        counts: &RunCounts,
        artifacts: &RunArtifacts,
        error: Option<&PipelineError>,
    ) -> ManifestEntry {
        self.finished = true;
        let entry = self.entry(
            status,
            counts,
            artifacts,
            error.map(ToString::to_string),
            error.map(PipelineError::kind),
        );
        self.append(&entry);
        entry
    }

    fn entry(
        &self,
        status: RunStatus,
        counts: &RunCounts,
        artifacts: &RunArtifacts,
        error_message: Option<String>,
        error_kind: Option<&str>,
    ) -> ManifestEntry {
        let mut metadata = serde_json::Map::new();
        metadata.insert("records_warned".into(), counts.records_warned.into());
        metadata.insert("records_quarantined".into(), counts.records_quarantined.into());
        metadata.insert("batches".into(), counts.batches.into());
        metadata.insert("retries".into(), counts.retries.into());
        metadata.insert("tracking_gaps".into(), counts.tracking_gaps.into());
        metadata.insert("dead_letter_artifact".into(), artifacts.dead_letter.clone().into());
        metadata.insert("schema_statements".into(), artifacts.schema_statements.clone().into());
        metadata.insert("dry_run".into(), self.dry_run.into());
        if let Some(kind) = error_kind {
            metadata.insert("error_kind".into(), kind.into());
        }

        ManifestEntry {
            run_id: self.run_id.clone(),
            pipeline_name: self.pipeline.clone(),
            source_kind: self.source_kind.clone(),
            destination_kind: self.destination_kind.clone(),
            started_at: self.started_at,
            completed_at: Utc::now(),
            status,
            records_read: counts.records_read,
            records_written: counts.records_written,
            records_failed: counts.records_failed,
            duration_secs: self.elapsed_secs(),
            error_message,
            metadata,
        }
    }

    fn append(&self, entry: &ManifestEntry) {
        match self.backend.append_manifest(entry) {
            Ok(()) => tracing::debug!(
                pipeline = self.pipeline.as_str(),
                run_id = %self.run_id,
                status = %entry.status,
                "Manifest entry appended"
            ),
            Err(e) => tracing::error!(
                pipeline = self.pipeline.as_str(),
                run_id = %self.run_id,
                error = %e,
                "Failed to append manifest entry"
            ),
        }
    }
}

impl Drop for RunTracker<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        tracing::error!(
            pipeline = self.pipeline.as_str(),
            run_id = %self.run_id,
            "Run ended without a terminal state"
        );
        let entry = self.entry(
            RunStatus::Failed,
            &RunCounts::default(),
            &RunArtifacts::default(),
            Some(ABORTED_MESSAGE.to_owned()),
            Some("aborted"),
        );
        self.append(&entry);
    }
}
