//! In-process connectors, for embedding and tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use sluice_types::error::ConnectorError;
use sluice_types::record::Record;
use sluice_types::schema::{Column, DdlStatement, Schema};

use super::{parse_config, WriteMode};
use crate::connector::{Destination, ExtractQuery, RecordStream, Source};

pub const KIND: &str = "memory";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemorySourceConfig {
    #[serde(default)]
    records: Vec<Record>,
}

/// Serves a fixed list of records, narrowed by the extract query.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Build from a `{records: [...]}` config block.
    ///
    /// # Errors
    ///
    /// Returns a config-category error for a malformed block.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ConnectorError> {
        let parsed: MemorySourceConfig = parse_config(KIND, config)?;
        Ok(Self::new(parsed.records))
    }
}

impl Source for MemorySource {
    fn kind(&self) -> &str {
        KIND
    }

    fn test_connection(&mut self) -> Result<bool, ConnectorError> {
        Ok(true)
    }

    fn read(&mut self, query: &ExtractQuery) -> Result<RecordStream<'_>, ConnectorError> {
        let query = query.clone();
        Ok(Box::new(
            self.records
                .iter()
                .filter(move |r| query.matches(r))
                .cloned()
                .map(Ok),
        ))
    }

    fn estimate_total_records(&mut self, query: &ExtractQuery) -> Option<u64> {
        u64::try_from(self.records.iter().filter(|r| query.matches(r)).count()).ok()
    }
}

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<Record>,
    schema: Option<Schema>,
    ddl_log: Vec<DdlStatement>,
}

/// Shared handle to a memory destination's content. Clones see the same
/// table.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    inner: Arc<Mutex<TableState>>,
}

impl MemoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A table that reports `schema` to preflight.
    #[must_use]
    pub fn with_schema(schema: Schema) -> Self {
        let table = Self::new();
        table.lock().schema = Some(schema);
        table
    }

    /// Seed existing rows, as if written by an earlier run.
    #[must_use]
    pub fn with_rows(self, rows: Vec<Record>) -> Self {
        self.lock().rows = rows;
        self
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Record> {
        self.lock().rows.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    #[must_use]
    pub fn schema(&self) -> Option<Schema> {
        self.lock().schema.clone()
    }

    /// DDL statements executed against the table, in order.
    #[must_use]
    pub fn ddl_log(&self) -> Vec<DdlStatement> {
        self.lock().ddl_log.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryDestinationConfig {
    #[serde(default)]
    write_mode: WriteMode,
    #[serde(default)]
    schema: Option<Vec<Column>>,
}

#[derive(Debug)]
pub struct MemoryDestination {
    table: MemoryTable,
    write_mode: WriteMode,
    written: bool,
}

impl MemoryDestination {
    #[must_use]
    pub fn new(table: MemoryTable, write_mode: WriteMode) -> Self {
        Self {
            table,
            write_mode,
            written: false,
        }
    }

    /// Build from a `{write_mode, schema}` config block, over a fresh table.
    ///
    /// # Errors
    ///
    /// Returns a config-category error for a malformed block.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ConnectorError> {
        let parsed: MemoryDestinationConfig = parse_config(KIND, config)?;
        let table = match parsed.schema {
            Some(columns) => MemoryTable::with_schema(Schema::new(columns)),
            None => MemoryTable::new(),
        };
        Ok(Self::new(table, parsed.write_mode))
    }

    #[must_use]
    pub fn table(&self) -> &MemoryTable {
        &self.table
    }

    fn truncate_once(&mut self, state: &mut TableState) {
        if self.write_mode == WriteMode::Replace && !self.written {
            state.rows.clear();
        }
        self.written = true;
    }
}

impl Destination for MemoryDestination {
    fn kind(&self) -> &str {
        KIND
    }

    fn test_connection(&mut self) -> Result<bool, ConnectorError> {
        Ok(true)
    }

    fn write(&mut self, batch: &[Record]) -> Result<(), ConnectorError> {
        let table = self.table.clone();
        let mut state = table.lock();
        self.truncate_once(&mut state);
        state.rows.extend_from_slice(batch);
        Ok(())
    }

    fn get_schema(&mut self) -> Result<Option<Schema>, ConnectorError> {
        Ok(self.table.schema())
    }

    fn supports_ddl(&self) -> bool {
        true
    }

    fn replaces_content(&self) -> bool {
        self.write_mode == WriteMode::Replace
    }

    fn begin_run(&mut self, resuming: bool) {
        self.written = resuming;
    }

    fn execute_ddl(&mut self, statement: &DdlStatement) -> Result<(), ConnectorError> {
        let mut state = self.table.lock();
        let schema = state.schema.get_or_insert_with(Schema::default);
        match statement {
            DdlStatement::AddColumn { column, .. } => {
                if !schema.push(column.clone()) {
                    return Err(ConnectorError::schema(
                        "COLUMN_EXISTS",
                        format!("column '{}' already exists", column.name),
                    ));
                }
            }
            DdlStatement::AlterColumnType { column, to, .. } => {
                let Some(existing) = schema.column_mut(column) else {
                    return Err(ConnectorError::schema(
                        "COLUMN_NOT_FOUND",
                        format!("column '{column}' does not exist"),
                    ));
                };
                existing.data_type = *to;
            }
        }
        state.ddl_log.push(statement.clone());
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), ConnectorError> {
        let table = self.table.clone();
        let mut state = table.lock();
        self.truncate_once(&mut state);
        Ok(())
    }
}
