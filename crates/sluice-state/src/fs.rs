//! Atomic file helpers shared by the file-backed stores.
//!
//! Writers stage content in a temporary file inside the destination
//! directory and rename it into place, so a concurrent reader sees either
//! the previous document or the new one, never a torn write.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{self, StateError};

fn stage(path: &Path, bytes: &[u8]) -> error::Result<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Replace `path` with `bytes` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> error::Result<()> {
    stage(path, bytes)?
        .persist(path)
        .map_err(|e| StateError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

/// Create `path` atomically, failing if it already exists.
pub fn create_atomic(path: &Path, bytes: &[u8]) -> error::Result<()> {
    stage(path, bytes)?
        .persist_noclobber(path)
        .map_err(|e| StateError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> error::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Read a JSON document, returning `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> error::Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
