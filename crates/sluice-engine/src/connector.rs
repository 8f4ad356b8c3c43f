//! Source and destination contracts consumed by the orchestrator.

use std::cmp::Ordering;

use sluice_types::error::ConnectorError;
use sluice_types::record::Record;
use sluice_types::schema::{DdlStatement, Schema};
use sluice_types::value::Value;

/// Lazy, finite, forward-only sequence of records.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, ConnectorError>> + Send + 'a>;

/// What a source is asked to extract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractQuery {
    /// Adapter-specific base query (e.g. SQL text). `None` means "everything".
    pub query: Option<String>,
    pub tracking_column: Option<String>,
    /// Only records whose tracking value is strictly greater are wanted.
    pub lower_bound: Option<Value>,
}

impl ExtractQuery {
    /// Whether `record` lies above the lower bound. Records without a
    /// comparable tracking value are kept when no bound is set and dropped
    /// otherwise.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let (Some(column), Some(bound)) = (&self.tracking_column, &self.lower_bound) else {
            return true;
        };
        record
            .get(column)
            .and_then(|v| v.compare_tracking(bound))
            .is_some_and(|ord| ord == Ordering::Greater)
    }

    /// SQL rendering of the narrowing predicate for SQL-backed sources:
    /// `"col" > <literal>`, or `None` without a bound.
    #[must_use]
    pub fn predicate_sql(&self) -> Option<String> {
        let column = self.tracking_column.as_deref()?;
        let bound = self.lower_bound.as_ref()?;
        let literal = match bound {
            Value::Int(_) | Value::Float(_) => bound.to_string(),
            Value::Bool(b) => b.to_string().to_uppercase(),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        };
        Some(format!("\"{}\" > {literal}", column.replace('"', "\"\"")))
    }
}

/// A place records are read from.
pub trait Source: Send {
    /// Registry type identifier, e.g. `"jsonl"`.
    fn kind(&self) -> &str;

    /// Verify the source is reachable.
    ///
    /// # Errors
    ///
    /// Returns a connection-category [`ConnectorError`] when unreachable.
    fn test_connection(&mut self) -> Result<bool, ConnectorError>;

    /// Start extraction. The returned stream is consumed lazily.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] if extraction cannot start.
    fn read(&mut self, query: &ExtractQuery) -> Result<RecordStream<'_>, ConnectorError>;

    /// Best-effort record count, for progress only.
    fn estimate_total_records(&mut self, _query: &ExtractQuery) -> Option<u64> {
        None
    }
}

/// A place records are written to.
pub trait Destination: Send {
    /// Registry type identifier.
    fn kind(&self) -> &str;

    /// Verify the destination is reachable.
    ///
    /// # Errors
    ///
    /// Returns a connection-category [`ConnectorError`] when unreachable.
    fn test_connection(&mut self) -> Result<bool, ConnectorError>;

    /// Write one batch, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`]; transient categories are retried.
    fn write(&mut self, batch: &[Record]) -> Result<(), ConnectorError>;

    /// Current schema of the target, or `None` when it has none yet or the
    /// destination is schemaless.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] if the schema cannot be fetched.
    fn get_schema(&mut self) -> Result<Option<Schema>, ConnectorError> {
        Ok(None)
    }

    fn supports_ddl(&self) -> bool {
        false
    }

    /// Whether a run overwrites the target's previous content. Such
    /// destinations are always fed a full extract.
    fn replaces_content(&self) -> bool {
        false
    }

    /// Called once before the first batch. `resuming` is set when the run
    /// continues an interrupted attempt whose committed rows must be kept.
    fn begin_run(&mut self, _resuming: bool) {}

    /// Apply one DDL statement.
    ///
    /// # Errors
    ///
    /// Returns a schema-category [`ConnectorError`] by default.
    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), ConnectorError> {
        Err(ConnectorError::schema(
            "DDL_UNSUPPORTED",
            format!("{} destination cannot execute: {statement}", self.kind()),
        ))
    }

    /// Called once after the final successful batch.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] if pending output cannot be committed.
    fn finalize(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
}
