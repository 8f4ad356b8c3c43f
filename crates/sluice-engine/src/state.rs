//! Opening the configured state backend and checkpoint store.

use std::sync::Arc;

use sluice_state::{CheckpointStore, FileCheckpointStore, FileStateBackend, SqliteStateBackend, StateBackend};

use crate::config::{StateBackendKind, StateConfig};
use crate::errors::PipelineError;

/// Database file name used by the `sqlite` backend inside `state.path`.
pub const SQLITE_FILE: &str = "state.db";

/// Shared persistence handles for a pipeline run.
#[derive(Clone)]
pub struct StateHandles {
    pub backend: Arc<dyn StateBackend>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

impl std::fmt::Debug for StateHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandles").finish_non_exhaustive()
    }
}

/// Open the backend named by `config`. Checkpoints always live on disk
/// under `config.path`.
///
/// # Errors
///
/// Returns [`PipelineError::State`] if the directory or database cannot be
/// opened.
pub fn open_state(config: &StateConfig) -> Result<StateHandles, PipelineError> {
    let backend: Arc<dyn StateBackend> = match config.backend {
        StateBackendKind::File => Arc::new(FileStateBackend::open(&config.path)?),
        StateBackendKind::Sqlite => Arc::new(SqliteStateBackend::open(&config.path.join(SQLITE_FILE))?),
    };
    tracing::debug!(backend = ?config.backend, path = %config.path.display(), "Opened state backend");
    Ok(StateHandles {
        backend,
        checkpoints: Arc::new(FileCheckpointStore::new(&config.path)),
    })
}
