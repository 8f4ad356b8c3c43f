//! Resume and high-water-mark model types.
//!
//! Pure data shared by the state crate (which persists them) and the engine
//! (which decides when to persist them).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Storage key for a resource's checkpoint, incremental state, and manifest
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for PipelineId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Per-run resume marker, rewritten after every durably written batch and
/// removed once the run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub pipeline_name: PipelineId,
    pub tracking_column: String,
    /// Highest tracking value covered by written batches.
    pub last_value: Value,
    /// Cumulative records handled, including earlier interrupted attempts.
    pub records_so_far: u64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Incremental state
// ---------------------------------------------------------------------------

/// Cross-run high-water mark for a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalState {
    pub pipeline_name: PipelineId,
    pub tracking_column: String,
    pub last_value: Value,
    pub updated_at: DateTime<Utc>,
}
