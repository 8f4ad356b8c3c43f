//! Dead-letter entries for quarantined records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::state::PipelineId;

/// A record removed from the write path, with its failure context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// 1-based position of the record within the run's extraction.
    pub row_number: u64,
    pub original_record: Record,
    /// Machine-readable failure class, e.g. `quality_violation`.
    pub error_kind: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

/// The single artifact a run's dead letters are flushed into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterArtifact {
    pub pipeline_name: PipelineId,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub total: usize,
    pub entries: Vec<DeadLetterEntry>,
}

impl DeadLetterArtifact {
    #[must_use]
    pub fn new(pipeline_name: PipelineId, run_id: impl Into<String>, entries: Vec<DeadLetterEntry>) -> Self {
        Self {
            pipeline_name,
            run_id: run_id.into(),
            created_at: Utc::now(),
            total: entries.len(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_total_matches_entries() {
        let entry = DeadLetterEntry {
            row_number: 3,
            original_record: Record::new().with("id", 3),
            error_kind: "quality_violation".into(),
            error_message: "not_null(email) failed".into(),
            timestamp: Utc::now(),
        };
        let artifact = DeadLetterArtifact::new(PipelineId::new("users"), "run-1", vec![entry]);
        assert_eq!(artifact.total, 1);
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["entries"][0]["original_record"]["id"], 3);
    }
}
