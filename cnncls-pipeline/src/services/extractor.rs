//! Archive extraction

use cnncls_common::fs::ensure_directories;
use cnncls_common::{Error, Result};
use std::fs::File;
use std::path::Path;

/// Unpack an archive into a directory
pub trait ArchiveExtractor: Send + Sync {
    /// Extract every entry of `archive` below `destination`; returns the entry count
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize>;
}

/// ZIP extractor; existing files are overwritten
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<usize> {
        if !archive.is_file() {
            return Err(Error::artifact_not_found(archive, "archive file does not exist"));
        }

        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| {
            Error::backend(format!("cannot open archive {}: {}", archive.display(), e))
        })?;

        ensure_directories(&[destination])?;
        let entries = zip.len();
        zip.extract(destination).map_err(|e| {
            Error::backend(format!("cannot extract {}: {}", archive.display(), e))
        })?;
        Ok(entries)
    }
}
