//! Schema model: columns, drift diffs, DDL intents, and history snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Logical column type understood by the schema subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    String,
}

impl DataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::String => "string",
        }
    }

    /// Generic SQL rendering used for DDL intents.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Datetime => "TIMESTAMP",
            Self::String => "TEXT",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Ordered set of columns with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema, keeping the first occurrence of any duplicated name.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        let mut schema = Self::default();
        for column in columns {
            if schema.column(&column.name).is_none() {
                schema.columns.push(column);
            }
        }
        schema
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Append a column unless one with the same name already exists.
    /// Returns whether the column was added.
    pub fn push(&mut self, column: Column) -> bool {
        if self.column(&column.name).is_some() {
            return false;
        }
        self.columns.push(column);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// A column present on both sides with differing types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeChange {
    pub name: String,
    /// Type currently held by the destination.
    pub old_type: DataType,
    /// Type observed in the source.
    pub new_type: DataType,
}

/// Structural drift between an incoming (source) and an existing
/// (destination) schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Source columns absent from the destination.
    pub added: Vec<Column>,
    /// Destination columns absent from the source.
    pub removed: Vec<Column>,
    pub changed: Vec<TypeChange>,
}

impl SchemaDiff {
    #[must_use]
    pub fn between(source: &Schema, destination: &Schema) -> Self {
        let mut diff = Self::default();
        for column in source.columns() {
            match destination.column(&column.name) {
                None => diff.added.push(column.clone()),
                Some(existing) if existing.data_type != column.data_type => {
                    diff.changed.push(TypeChange {
                        name: column.name.clone(),
                        old_type: existing.data_type,
                        new_type: column.data_type,
                    });
                }
                Some(_) => {}
            }
        }
        diff.removed = destination
            .columns()
            .iter()
            .filter(|c| source.column(&c.name).is_none())
            .cloned()
            .collect();
        diff
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DDL intents
// ---------------------------------------------------------------------------

/// Non-destructive DDL a destination may be asked to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DdlStatement {
    AddColumn {
        table: String,
        column: Column,
    },
    AlterColumnType {
        table: String,
        column: String,
        from: DataType,
        to: DataType,
    },
}

impl DdlStatement {
    /// Column the statement touches.
    #[must_use]
    pub fn column_name(&self) -> &str {
        match self {
            Self::AddColumn { column, .. } => &column.name,
            Self::AlterColumnType { column, .. } => column,
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddColumn { table, column } => write!(
                f,
                "ALTER TABLE \"{table}\" ADD COLUMN \"{}\" {}{}",
                column.name,
                column.data_type.sql_type(),
                if column.nullable { " NULL" } else { " NOT NULL" },
            ),
            Self::AlterColumnType { table, column, to, .. } => write!(
                f,
                "ALTER TABLE \"{table}\" ALTER COLUMN \"{column}\" TYPE {}",
                to.sql_type()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Immutable pre-change schema captured before evolution DDL runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub resource: String,
    /// 1-based, strictly increasing per resource.
    pub version: u32,
    pub captured_at: DateTime<Utc>,
    pub schema: Schema,
    /// Rendered statements that were about to run when the snapshot was taken.
    #[serde(default)]
    pub statements: Vec<String>,
}
