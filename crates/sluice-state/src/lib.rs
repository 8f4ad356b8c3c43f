//! Pipeline state persistence for the Sluice engine.
//!
//! Provides the [`StateBackend`] and [`CheckpointStore`] traits plus
//! file-backed and `SQLite`-backed implementations for incremental
//! high-water marks, the run manifest, dead-letter artifacts, schema
//! history, and per-run checkpoints.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod checkpoint;
pub mod error;
pub mod file;
pub mod fs;
pub mod sqlite;

pub use backend::{CheckpointStore, StateBackend};
pub use checkpoint::FileCheckpointStore;
pub use error::StateError;
pub use file::FileStateBackend;
pub use sqlite::SqliteStateBackend;

/// Convenience re-exports for callers that need both the traits and the
/// model types they speak.
pub mod prelude {
    pub use crate::backend::{CheckpointStore, StateBackend};
    pub use crate::checkpoint::FileCheckpointStore;
    pub use crate::error::StateError;
    pub use crate::file::FileStateBackend;
    pub use crate::sqlite::SqliteStateBackend;
    pub use sluice_types::prelude::*;
}
