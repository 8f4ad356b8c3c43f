//! Pipeline error model.
//!
//! Every fatal outcome of a resource run is one [`PipelineError`]; its
//! rendered message is what lands in the manifest's `error_message`.

use sluice_state::StateError;
use sluice_types::error::ConnectorError;

/// Which side of the pipeline a connector error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Destination => "destination",
        })
    }
}

/// Categorized pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Connection test failed, or reported the endpoint unusable.
    #[error("{side} connection failed: {source}")]
    Connection {
        side: Side,
        #[source]
        source: ConnectorError,
    },

    /// Invalid pipeline configuration. Raised before preflight.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Source and destination schemas are incompatible.
    #[error("schema incompatibility: {0}")]
    SchemaIncompatibility(String),

    /// A record failed a check whose action is `fail`.
    #[error("quality check failed at row {row_number}: {message}")]
    QualityViolation { row_number: u64, message: String },

    /// Destination write failed terminally or exhausted its retries.
    #[error("write failed after {attempts} attempt(s): {source}")]
    Write {
        attempts: u32,
        #[source]
        source: ConnectorError,
    },

    /// Evolution policy rejected the drift, or DDL execution failed.
    #[error("schema evolution failed: {0}")]
    Evolution(String),

    /// Source failed while streaming records.
    #[error("source read failed: {0}")]
    Read(#[source] ConnectorError),

    /// Checkpoint, incremental state, manifest or dead-letter persistence.
    #[error("state persistence failed: {0}")]
    State(#[from] StateError),

    /// Anything else (task join failures and the like).
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl PipelineError {
    /// Short machine-readable kind, recorded in manifest metadata.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_failure",
            Self::Configuration(_) => "configuration_error",
            Self::SchemaIncompatibility(_) => "schema_incompatibility",
            Self::QualityViolation { .. } => "quality_violation",
            Self::Write { .. } => "write_failure",
            Self::Evolution(_) => "evolution_apply_failure",
            Self::Read(_) => "read_failure",
            Self::State(_) => "state_failure",
            Self::Infrastructure(_) => "infrastructure",
        }
    }

    /// Returns the typed connector error, if one is wrapped.
    #[must_use]
    pub fn as_connector_error(&self) -> Option<&ConnectorError> {
        match self {
            Self::Connection { source, .. } | Self::Write { source, .. } | Self::Read(source) => {
                Some(source)
            }
            _ => None,
        }
    }
}
