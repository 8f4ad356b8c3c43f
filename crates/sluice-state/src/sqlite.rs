//! `SQLite`-backed implementation of [`StateBackend`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Values, records and
//! schemas are stored as JSON text; timestamps as RFC 3339.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use sluice_types::dead_letter::DeadLetterEntry;
use sluice_types::manifest::{ManifestEntry, RunStatus};
use sluice_types::schema::{Schema, SchemaSnapshot};
use sluice_types::state::{IncrementalState, PipelineId};
use sluice_types::value::Value;

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS incremental_state (
    pipeline TEXT PRIMARY KEY,
    tracking_column TEXT NOT NULL,
    last_value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS run_manifest (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    pipeline TEXT NOT NULL,
    source_kind TEXT NOT NULL,
    destination_kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    status TEXT NOT NULL,
    records_read INTEGER NOT NULL DEFAULT 0,
    records_written INTEGER NOT NULL DEFAULT 0,
    records_failed INTEGER NOT NULL DEFAULT 0,
    duration_secs REAL NOT NULL,
    error_message TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_run_manifest_pipeline ON run_manifest (pipeline, seq);

CREATE TABLE IF NOT EXISTS dead_letters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    run_id TEXT NOT NULL,
    row_number INTEGER NOT NULL,
    record_json TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    error_message TEXT NOT NULL,
    failed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dead_letters_pipeline_run ON dead_letters (pipeline, run_id);

CREATE TABLE IF NOT EXISTS schema_history (
    resource TEXT NOT NULL,
    version INTEGER NOT NULL,
    captured_at TEXT NOT NULL,
    schema_json TEXT NOT NULL,
    statements_json TEXT NOT NULL,
    PRIMARY KEY (resource, version)
);
";

/// `SQLite`-backed state storage.
///
/// Create with [`SqliteStateBackend::open`] for file-backed persistence
/// or [`SqliteStateBackend::in_memory`] for tests.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

impl SqliteStateBackend {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }
}

/// Column-index conversion error for values SQLite returned as text.
fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e))
}

#[allow(clippy::cast_sign_loss)]
fn manifest_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ManifestEntry> {
    let status: String = row.get(6)?;
    let metadata: String = row.get(12)?;
    Ok(ManifestEntry {
        run_id: row.get(0)?,
        pipeline_name: PipelineId::new(row.get::<_, String>(1)?),
        source_kind: row.get(2)?,
        destination_kind: row.get(3)?,
        started_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
        completed_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        records_read: row.get::<_, i64>(7)? as u64,
        records_written: row.get::<_, i64>(8)? as u64,
        records_failed: row.get::<_, i64>(9)? as u64,
        duration_secs: row.get(10)?,
        error_message: row.get(11)?,
        metadata: parse_json(12, &metadata)?,
    })
}

const MANIFEST_COLUMNS: &str = "run_id, pipeline, source_kind, destination_kind, started_at, \
     completed_at, status, records_read, records_written, records_failed, duration_secs, \
     error_message, metadata";

impl StateBackend for SqliteStateBackend {
    fn incremental_state(&self, pipeline: &PipelineId) -> error::Result<Option<IncrementalState>> {
        let conn = self.lock_conn()?;
        let state = conn
            .query_row(
                "SELECT tracking_column, last_value, updated_at \
                 FROM incremental_state WHERE pipeline = ?1",
                [pipeline.as_str()],
                |row| {
                    let last_value: String = row.get(1)?;
                    let updated_at: String = row.get(2)?;
                    Ok(IncrementalState {
                        pipeline_name: pipeline.clone(),
                        tracking_column: row.get(0)?,
                        last_value: parse_json(1, &last_value)?,
                        updated_at: parse_timestamp(2, &updated_at)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    fn set_last_value(
        &self,
        pipeline: &PipelineId,
        tracking_column: &str,
        value: &Value,
    ) -> error::Result<()> {
        let encoded = serde_json::to_string(value)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO incremental_state (pipeline, tracking_column, last_value, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (pipeline) DO UPDATE SET \
                tracking_column = excluded.tracking_column, \
                last_value = excluded.last_value, \
                updated_at = excluded.updated_at",
            rusqlite::params![pipeline.as_str(), tracking_column, encoded, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn append_manifest(&self, entry: &ManifestEntry) -> error::Result<()> {
        let metadata = serde_json::to_string(&entry.metadata)?;
        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO run_manifest ({MANIFEST_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            rusqlite::params![
                entry.run_id,
                entry.pipeline_name.as_str(),
                entry.source_kind,
                entry.destination_kind,
                entry.started_at.to_rfc3339(),
                entry.completed_at.to_rfc3339(),
                entry.status.as_str(),
                entry.records_read as i64,
                entry.records_written as i64,
                entry.records_failed as i64,
                entry.duration_secs,
                entry.error_message,
                metadata,
            ],
        )?;
        Ok(())
    }

    fn manifest_entries(&self, pipeline: Option<&PipelineId>) -> error::Result<Vec<ManifestEntry>> {
        let conn = self.lock_conn()?;
        let entries = match pipeline {
            Some(p) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MANIFEST_COLUMNS} FROM run_manifest WHERE pipeline = ?1 ORDER BY seq"
                ))?;
                let rows = stmt.query_map([p.as_str()], manifest_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MANIFEST_COLUMNS} FROM run_manifest ORDER BY seq"
                ))?;
                let rows = stmt.query_map([], manifest_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(entries)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn write_dead_letters(
        &self,
        pipeline: &PipelineId,
        run_id: &str,
        entries: &[DeadLetterEntry],
    ) -> error::Result<String> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dead_letters \
                 (pipeline, run_id, row_number, record_json, error_kind, error_message, failed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in entries {
                let record_json = serde_json::to_string(&entry.original_record)?;
                stmt.execute(rusqlite::params![
                    pipeline.as_str(),
                    run_id,
                    entry.row_number as i64,
                    record_json,
                    entry.error_kind,
                    entry.error_message,
                    entry.timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(format!("sqlite:dead_letters/{pipeline}/{run_id}"))
    }

    #[allow(clippy::cast_sign_loss)]
    fn dead_letters(&self, pipeline: &PipelineId, run_id: &str) -> error::Result<Vec<DeadLetterEntry>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT row_number, record_json, error_kind, error_message, failed_at \
             FROM dead_letters WHERE pipeline = ?1 AND run_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(rusqlite::params![pipeline.as_str(), run_id], |row| {
            let record_json: String = row.get(1)?;
            let failed_at: String = row.get(4)?;
            Ok(DeadLetterEntry {
                row_number: row.get::<_, i64>(0)? as u64,
                original_record: parse_json(1, &record_json)?,
                error_kind: row.get(2)?,
                error_message: row.get(3)?,
                timestamp: parse_timestamp(4, &failed_at)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn append_schema_snapshot(
        &self,
        resource: &str,
        schema: &Schema,
        statements: &[String],
    ) -> error::Result<SchemaSnapshot> {
        let schema_json = serde_json::to_string(schema)?;
        let statements_json = serde_json::to_string(statements)?;
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let version: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM schema_history WHERE resource = ?1",
            [resource],
            |row| row.get(0),
        )?;
        let captured_at = Utc::now();
        tx.execute(
            "INSERT INTO schema_history (resource, version, captured_at, schema_json, statements_json) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![resource, version, captured_at.to_rfc3339(), schema_json, statements_json],
        )?;
        tx.commit()?;
        Ok(SchemaSnapshot {
            resource: resource.to_owned(),
            version,
            captured_at,
            schema: schema.clone(),
            statements: statements.to_vec(),
        })
    }

    fn schema_history(&self, resource: &str) -> error::Result<Vec<SchemaSnapshot>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT version, captured_at, schema_json, statements_json \
             FROM schema_history WHERE resource = ?1 ORDER BY version",
        )?;
        let rows = stmt.query_map([resource], |row| {
            let captured_at: String = row.get(1)?;
            let schema_json: String = row.get(2)?;
            let statements_json: String = row.get(3)?;
            Ok(SchemaSnapshot {
                resource: resource.to_owned(),
                version: row.get(0)?,
                captured_at: parse_timestamp(1, &captured_at)?,
                schema: parse_json(2, &schema_json)?,
                statements: parse_json(3, &statements_json)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
