//! Shared Sluice data model: records, schemas, quality checks, resume state,
//! audit entries, and the connector error model.
//!
//! This crate has no I/O and is safe to depend on from both the state and
//! engine crates.

pub mod dead_letter;
pub mod error;
pub mod manifest;
pub mod quality;
pub mod record;
pub mod schema;
pub mod state;
pub mod value;

pub mod prelude {
    pub use crate::dead_letter::{DeadLetterArtifact, DeadLetterEntry};
    pub use crate::error::{ConnectorError, ErrorCategory};
    pub use crate::manifest::{ManifestEntry, RunStatus};
    pub use crate::quality::{CheckKind, QualityAction, QualityCheck};
    pub use crate::record::Record;
    pub use crate::schema::{Column, DataType, DdlStatement, Schema, SchemaDiff, SchemaSnapshot, TypeChange};
    pub use crate::state::{Checkpoint, IncrementalState, PipelineId};
    pub use crate::value::Value;
}
