//! Artifact directory management and JSON side files
//!
//! Every stage calls [`ensure_directories`] before writing; creating a
//! directory that already exists is a no-op.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Create each directory (and its parents) if missing
pub fn ensure_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        ensure_directory(path.as_ref())?;
    }
    Ok(())
}

/// Create one directory if missing; returns whether it was created
pub fn ensure_directory(path: &Path) -> Result<bool> {
    if path.is_dir() {
        tracing::debug!(path = %path.display(), "Directory already exists");
        return Ok(false);
    }
    std::fs::create_dir_all(path)?;
    tracing::info!(path = %path.display(), "Created directory");
    Ok(true)
}

/// Create the parent directory of a file path, if it has one
pub fn ensure_parent_dir(file: &Path) -> Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Write `data` as pretty-printed JSON, replacing any existing file
pub fn save_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let content = serde_json::to_string_pretty(data)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "JSON file saved");
    Ok(())
}

/// Read a JSON file into `T`
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::artifact_not_found(path, "JSON file does not exist"));
    }
    let content = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), "JSON file loaded");
    Ok(value)
}

/// Human readable size of a file in kilobytes, e.g. `"~ 12 KB"`
pub fn file_size_label(path: &Path) -> Result<String> {
    let bytes = std::fs::metadata(path)?.len();
    let kb = (bytes as f64 / 1024.0).round() as u64;
    Ok(format!("~ {} KB", kb))
}
