//! Storage contracts.
//!
//! [`StateBackend`] covers everything that outlives a single run: the
//! incremental high-water mark, the run manifest, dead-letter artifacts, and
//! schema history. [`CheckpointStore`] covers the per-run resume marker,
//! whose lifecycle is owned by the orchestrator. Model types live in
//! [`sluice_types`].

use sluice_types::dead_letter::DeadLetterEntry;
use sluice_types::manifest::{ManifestEntry, RunStatus};
use sluice_types::schema::{Schema, SchemaSnapshot};
use sluice_types::state::{Checkpoint, IncrementalState, PipelineId};
use sluice_types::value::Value;

use crate::error;

/// Durable, cross-run pipeline state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateBackend>`.
pub trait StateBackend: Send + Sync {
    /// Read the persisted high-water mark for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn incremental_state(&self, pipeline: &PipelineId) -> error::Result<Option<IncrementalState>>;

    /// Overwrite the high-water mark for a pipeline.
    ///
    /// Callers are responsible for only moving the mark forward.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn set_last_value(
        &self,
        pipeline: &PipelineId,
        tracking_column: &str,
        value: &Value,
    ) -> error::Result<()>;

    /// Shorthand for the stored value alone.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_last_value(&self, pipeline: &PipelineId) -> error::Result<Option<Value>> {
        Ok(self.incremental_state(pipeline)?.map(|s| s.last_value))
    }

    /// Append one run record. Existing entries are never modified.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn append_manifest(&self, entry: &ManifestEntry) -> error::Result<()>;

    /// All manifest entries in append order, optionally for one pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn manifest_entries(&self, pipeline: Option<&PipelineId>) -> error::Result<Vec<ManifestEntry>>;

    /// Most recent run of a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_run(&self, pipeline: &PipelineId) -> error::Result<Option<ManifestEntry>> {
        Ok(self.manifest_entries(Some(pipeline))?.pop())
    }

    /// Runs that ended in [`RunStatus::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn failed_runs(&self, pipeline: Option<&PipelineId>) -> error::Result<Vec<ManifestEntry>> {
        Ok(self
            .manifest_entries(pipeline)?
            .into_iter()
            .filter(|e| e.status == RunStatus::Failed)
            .collect())
    }

    /// Persist a run's dead letters as one artifact and return its location.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn write_dead_letters(
        &self,
        pipeline: &PipelineId,
        run_id: &str,
        entries: &[DeadLetterEntry],
    ) -> error::Result<String>;

    /// Read back a previously flushed artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn dead_letters(&self, pipeline: &PipelineId, run_id: &str) -> error::Result<Vec<DeadLetterEntry>>;

    /// Append a pre-change schema snapshot; assigns the next version.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn append_schema_snapshot(
        &self,
        resource: &str,
        schema: &Schema,
        statements: &[String],
    ) -> error::Result<SchemaSnapshot>;

    /// All snapshots for a resource, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn schema_history(&self, resource: &str) -> error::Result<Vec<SchemaSnapshot>>;

    /// Most recent snapshot for a resource.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn latest_schema(&self, resource: &str) -> error::Result<Option<SchemaSnapshot>> {
        Ok(self.schema_history(resource)?.pop())
    }
}

/// Per-run resume marker storage.
pub trait CheckpointStore: Send + Sync {
    /// Atomically replace the checkpoint for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn save(
        &self,
        pipeline: &PipelineId,
        tracking_column: &str,
        last_value: &Value,
        records_so_far: u64,
    ) -> error::Result<Checkpoint>;

    /// Load the checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn load(&self, pipeline: &PipelineId) -> error::Result<Option<Checkpoint>>;

    /// Remove the checkpoint. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn clear(&self, pipeline: &PipelineId) -> error::Result<bool>;
}
