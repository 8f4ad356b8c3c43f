//! Schema intelligence: inference from samples, compatibility validation,
//! and drift evolution.

pub mod evolution;
pub mod infer;
pub mod validate;

pub use evolution::{EvolutionConfig, EvolutionManager, EvolutionMode, EvolutionPlan};
pub use infer::{infer, SchemaInference, DEFAULT_SAMPLE_SIZE};
pub use validate::{CompatibilityReport, IssueKind, SchemaIssue, SchemaValidator, Severity};

use sluice_types::schema::DataType;

/// How moving values of one type into a column of another type behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCompatibility {
    Identical,
    /// Lossless; always allowed.
    Widening,
    /// May lose information depending on the data.
    Narrowing,
    Incompatible,
}

/// Lossless `from -> to` conversions.
const WIDENING: &[(DataType, DataType)] = &[
    (DataType::Integer, DataType::Float),
    (DataType::Integer, DataType::String),
    (DataType::Float, DataType::String),
    (DataType::Boolean, DataType::Integer),
    (DataType::Boolean, DataType::String),
    (DataType::Date, DataType::Datetime),
    (DataType::Date, DataType::String),
    (DataType::Datetime, DataType::String),
];

/// Classify writing `from` values into a `to` column. Narrowing is exactly
/// the reverse of a widening pair.
#[must_use]
pub fn classify(from: DataType, to: DataType) -> TypeCompatibility {
    if from == to {
        TypeCompatibility::Identical
    } else if WIDENING.contains(&(from, to)) {
        TypeCompatibility::Widening
    } else if WIDENING.contains(&(to, from)) {
        TypeCompatibility::Narrowing
    } else {
        TypeCompatibility::Incompatible
    }
}
