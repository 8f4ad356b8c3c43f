//! Directory-backed implementation of [`StateBackend`].
//!
//! Layout under the root directory:
//!
//! ```text
//! state.json                              incremental high-water marks
//! manifest.json                           {"version": "1.0", "runs": [...]}
//! dead_letters/<pipeline>/<run_id>.json   one artifact per run
//! schemas/<resource>/v000001.json         append-only schema history
//! ```
//!
//! Read-modify-write cycles are serialized by an in-process mutex and every
//! document is replaced atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sluice_types::dead_letter::{DeadLetterArtifact, DeadLetterEntry};
use sluice_types::manifest::ManifestEntry;
use sluice_types::schema::{Schema, SchemaSnapshot};
use sluice_types::state::{IncrementalState, PipelineId};
use sluice_types::value::Value;

use crate::backend::StateBackend;
use crate::checkpoint::sanitize;
use crate::error::{self, StateError};
use crate::fs;

const MANIFEST_VERSION: &str = "1.0";
const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    #[serde(default)]
    pipelines: BTreeMap<PipelineId, IncrementalState>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            pipelines: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestDocument {
    version: String,
    #[serde(default)]
    runs: Vec<ManifestEntry>,
}

impl Default for ManifestDocument {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_owned(),
            runs: Vec::new(),
        }
    }
}

/// File-system state storage rooted at a directory.
pub struct FileStateBackend {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStateBackend {
    /// Open (creating if needed) a state directory.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created.
    pub fn open(root: &Path) -> error::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn guard(&self) -> error::Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    fn dead_letter_path(&self, pipeline: &PipelineId, run_id: &str) -> PathBuf {
        self.root
            .join("dead_letters")
            .join(sanitize(pipeline.as_str()))
            .join(format!("{}.json", sanitize(run_id)))
    }

    fn schema_dir(&self, resource: &str) -> PathBuf {
        self.root.join("schemas").join(sanitize(resource))
    }

    fn load_state(&self) -> error::Result<StateDocument> {
        Ok(fs::read_json(&self.state_path())?.unwrap_or_default())
    }

    fn load_manifest(&self) -> error::Result<ManifestDocument> {
        Ok(fs::read_json(&self.manifest_path())?.unwrap_or_default())
    }

    fn read_snapshots(&self, resource: &str) -> error::Result<Vec<SchemaSnapshot>> {
        let dir = self.schema_dir(resource);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut snapshots = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(snapshot) = fs::read_json::<SchemaSnapshot>(&path)? {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by_key(|s| s.version);
        Ok(snapshots)
    }
}

impl StateBackend for FileStateBackend {
    fn incremental_state(&self, pipeline: &PipelineId) -> error::Result<Option<IncrementalState>> {
        let _guard = self.guard()?;
        Ok(self.load_state()?.pipelines.remove(pipeline))
    }

    fn set_last_value(
        &self,
        pipeline: &PipelineId,
        tracking_column: &str,
        value: &Value,
    ) -> error::Result<()> {
        let _guard = self.guard()?;
        let mut doc = self.load_state()?;
        doc.pipelines.insert(
            pipeline.clone(),
            IncrementalState {
                pipeline_name: pipeline.clone(),
                tracking_column: tracking_column.to_owned(),
                last_value: value.clone(),
                updated_at: Utc::now(),
            },
        );
        fs::write_json(&self.state_path(), &doc)
    }

    fn append_manifest(&self, entry: &ManifestEntry) -> error::Result<()> {
        let _guard = self.guard()?;
        let mut doc = self.load_manifest()?;
        doc.runs.push(entry.clone());
        fs::write_json(&self.manifest_path(), &doc)
    }

    fn manifest_entries(&self, pipeline: Option<&PipelineId>) -> error::Result<Vec<ManifestEntry>> {
        let _guard = self.guard()?;
        let runs = self.load_manifest()?.runs;
        Ok(match pipeline {
            Some(p) => runs.into_iter().filter(|e| &e.pipeline_name == p).collect(),
            None => runs,
        })
    }

    fn write_dead_letters(
        &self,
        pipeline: &PipelineId,
        run_id: &str,
        entries: &[DeadLetterEntry],
    ) -> error::Result<String> {
        let path = self.dead_letter_path(pipeline, run_id);
        let artifact = DeadLetterArtifact::new(pipeline.clone(), run_id, entries.to_vec());
        fs::write_json(&path, &artifact)?;
        Ok(path.display().to_string())
    }

    fn dead_letters(&self, pipeline: &PipelineId, run_id: &str) -> error::Result<Vec<DeadLetterEntry>> {
        let artifact: Option<DeadLetterArtifact> =
            fs::read_json(&self.dead_letter_path(pipeline, run_id))?;
        Ok(artifact.map(|a| a.entries).unwrap_or_default())
    }

    fn append_schema_snapshot(
        &self,
        resource: &str,
        schema: &Schema,
        statements: &[String],
    ) -> error::Result<SchemaSnapshot> {
        let _guard = self.guard()?;
        let next = self
            .read_snapshots(resource)?
            .last()
            .map_or(1, |s| s.version + 1);
        let snapshot = SchemaSnapshot {
            resource: resource.to_owned(),
            version: next,
            captured_at: Utc::now(),
            schema: schema.clone(),
            statements: statements.to_vec(),
        };
        let path = self.schema_dir(resource).join(format!("v{next:06}.json"));
        fs::create_atomic(&path, &serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(snapshot)
    }

    fn schema_history(&self, resource: &str) -> error::Result<Vec<SchemaSnapshot>> {
        let _guard = self.guard()?;
        self.read_snapshots(resource)
    }
}
