//! In-memory dead-letter collection, flushed once per run.

use chrono::Utc;
use sluice_state::StateBackend;
use sluice_types::dead_letter::DeadLetterEntry;
use sluice_types::record::Record;
use sluice_types::state::PipelineId;

use crate::errors::PipelineError;

/// Accumulates quarantined records for a single run.
#[derive(Debug, Default)]
pub struct DeadLetterSink {
    entries: Vec<DeadLetterEntry>,
}

impl DeadLetterSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        row_number: u64,
        original_record: Record,
        error_kind: impl Into<String>,
        error_message: impl Into<String>,
    ) {
        self.entries.push(DeadLetterEntry {
            row_number,
            original_record,
            error_kind: error_kind.into(),
            error_message: error_message.into(),
            timestamp: Utc::now(),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[DeadLetterEntry] {
        &self.entries
    }

    /// Persist the whole collection as one artifact. Writes nothing and
    /// returns `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::State`] if the artifact cannot be written.
    pub fn flush(
        &self,
        backend: &dyn StateBackend,
        pipeline: &PipelineId,
        run_id: &str,
    ) -> Result<Option<String>, PipelineError> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let location = backend.write_dead_letters(pipeline, run_id, &self.entries)?;
        tracing::info!(
            pipeline = pipeline.as_str(),
            run_id,
            dlq_records = self.entries.len(),
            location = %location,
            "Persisted dead-letter records"
        );
        Ok(Some(location))
    }
}
