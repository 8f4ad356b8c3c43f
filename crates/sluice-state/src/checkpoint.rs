//! File-backed [`CheckpointStore`].
//!
//! One JSON document per pipeline under `<root>/checkpoints/`. Saves go
//! through [`write_atomic`](crate::fs::write_atomic); an unreadable document
//! is reported and treated as absent so the next run falls back to the
//! incremental high-water mark instead of refusing to start.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sluice_types::state::{Checkpoint, PipelineId};
use sluice_types::value::Value;

use crate::backend::CheckpointStore;
use crate::error;
use crate::fs;

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Store checkpoints under `root/checkpoints`. The directory is created
    /// lazily on first save.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("checkpoints"),
        }
    }

    fn path_for(&self, pipeline: &PipelineId) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(pipeline.as_str())))
    }
}

/// Keep file names portable: anything outside `[A-Za-z0-9_.-]` becomes `_`.
/// Distinct names can map to the same file, so callers that key storage by
/// name should reject such collisions up front.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect()
}

impl CheckpointStore for FileCheckpointStore {
    fn save(
        &self,
        pipeline: &PipelineId,
        tracking_column: &str,
        last_value: &Value,
        records_so_far: u64,
    ) -> error::Result<Checkpoint> {
        let checkpoint = Checkpoint {
            pipeline_name: pipeline.clone(),
            tracking_column: tracking_column.to_owned(),
            last_value: last_value.clone(),
            records_so_far,
            created_at: Utc::now(),
        };
        fs::write_json(&self.path_for(pipeline), &checkpoint)?;
        Ok(checkpoint)
    }

    fn load(&self, pipeline: &PipelineId) -> error::Result<Option<Checkpoint>> {
        let path = self.path_for(pipeline);
        match fs::read_json::<Checkpoint>(&path) {
            Ok(found) => Ok(found),
            Err(crate::error::StateError::Json(e)) => {
                tracing::warn!(
                    pipeline = %pipeline,
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable checkpoint"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn clear(&self, pipeline: &PipelineId) -> error::Result<bool> {
        match std::fs::remove_file(self.path_for(pipeline)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
