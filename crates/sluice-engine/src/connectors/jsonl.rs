//! Newline-delimited JSON files.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sluice_types::error::ConnectorError;
use sluice_types::record::Record;

use super::{parse_config, WriteMode};
use crate::connector::{Destination, ExtractQuery, RecordStream, Source};

pub const KIND: &str = "jsonl";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonlSourceConfig {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// # Errors
    ///
    /// Returns a config-category error when `path` is missing.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ConnectorError> {
        let parsed: JsonlSourceConfig = parse_config(KIND, config)?;
        Ok(Self::new(parsed.path))
    }

    fn open(&self) -> Result<File, ConnectorError> {
        File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConnectorError::config(
                "FILE_NOT_FOUND",
                format!("source file not found: {}", self.path.display()),
            ),
            _ => ConnectorError::from_io("OPEN_FAILED", &e),
        })
    }
}

fn parse_line(line_number: usize, line: &str) -> Result<Record, ConnectorError> {
    serde_json::from_str(line).map_err(|e| {
        ConnectorError::data("INVALID_JSON", format!("line {line_number}: {e}"))
    })
}

impl Source for JsonlSource {
    fn kind(&self) -> &str {
        KIND
    }

    fn test_connection(&mut self) -> Result<bool, ConnectorError> {
        self.open().map(|_| true)
    }

    fn read(&mut self, query: &ExtractQuery) -> Result<RecordStream<'_>, ConnectorError> {
        let reader = BufReader::new(self.open()?);
        let query = query.clone();
        let stream = reader
            .lines()
            .enumerate()
            .filter_map(move |(i, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some(Err(ConnectorError::from_io("READ_FAILED", &e))),
                };
                if line.trim().is_empty() {
                    return None;
                }
                match parse_line(i + 1, &line) {
                    Ok(record) if query.matches(&record) => Some(Ok(record)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            });
        Ok(Box::new(stream))
    }

    fn estimate_total_records(&mut self, _query: &ExtractQuery) -> Option<u64> {
        let reader = BufReader::new(self.open().ok()?);
        let count = reader
            .lines()
            .map_while(Result::ok)
            .filter(|l| !l.trim().is_empty())
            .count();
        u64::try_from(count).ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonlDestinationConfig {
    path: PathBuf,
    #[serde(default)]
    write_mode: WriteMode,
}

#[derive(Debug)]
pub struct JsonlDestination {
    path: PathBuf,
    write_mode: WriteMode,
    written: bool,
}

impl JsonlDestination {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, write_mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            write_mode,
            written: false,
        }
    }

    /// # Errors
    ///
    /// Returns a config-category error when `path` is missing.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ConnectorError> {
        let parsed: JsonlDestinationConfig = parse_config(KIND, config)?;
        Ok(Self::new(parsed.path, parsed.write_mode))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_for_batch(&self) -> Result<File, ConnectorError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if self.write_mode == WriteMode::Replace && !self.written {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        options
            .open(&self.path)
            .map_err(|e| ConnectorError::from_io("OPEN_FAILED", &e))
    }
}

/// Append `buf` to `file`, cutting the file back to its prior length if the
/// write does not complete.
fn append_whole(file: &mut File, buf: &[u8]) -> Result<(), ConnectorError> {
    let start = file
        .metadata()
        .map_err(|e| ConnectorError::from_io("WRITE_FAILED", &e))?
        .len();
    let written = file.write_all(buf).and_then(|()| file.flush());
    if let Err(e) = written {
        if let Err(rollback) = file.set_len(start) {
            tracing::error!(error = %rollback, "Failed to roll back partial batch");
        }
        return Err(ConnectorError::from_io("WRITE_FAILED", &e));
    }
    Ok(())
}

impl Destination for JsonlDestination {
    fn kind(&self) -> &str {
        KIND
    }

    fn test_connection(&mut self) -> Result<bool, ConnectorError> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => std::fs::create_dir_all(dir)
                .map(|()| true)
                .map_err(|e| ConnectorError::from_io("DIR_UNAVAILABLE", &e)),
            None => Ok(true),
        }
    }

    fn write(&mut self, batch: &[Record]) -> Result<(), ConnectorError> {
        let mut buf = Vec::with_capacity(batch.len() * 64);
        for record in batch {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| ConnectorError::data("SERIALIZE_FAILED", e.to_string()))?;
            buf.push(b'\n');
        }
        let mut file = self.open_for_batch()?;
        append_whole(&mut file, &buf)?;
        self.written = true;
        Ok(())
    }

    fn replaces_content(&self) -> bool {
        self.write_mode == WriteMode::Replace
    }

    fn begin_run(&mut self, resuming: bool) {
        self.written = resuming;
    }

    fn finalize(&mut self) -> Result<(), ConnectorError> {
        if self.write_mode == WriteMode::Replace && !self.written {
            self.open_for_batch()?;
            self.written = true;
        }
        Ok(())
    }
}
