//! Remote archive download
//!
//! Share links look like `https://drive.google.com/file/d/<id>/view?usp=sharing`;
//! the identifier is the second-to-last `/` segment and is appended to the
//! configured download prefix.

use cnncls_common::fs::ensure_parent_dir;
use cnncls_common::{Error, Result};
use std::fs::File;
use std::path::Path;

/// Download a remote archive to a local file
pub trait ArchiveFetcher: Send + Sync {
    /// Fetch `url` into `destination`, replacing it; returns bytes written
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Second-to-last `/` segment of a share URL
pub fn remote_file_id(source_url: &str) -> Result<String> {
    let segments: Vec<&str> = source_url.split('/').collect();
    match segments.len().checked_sub(2).map(|i| segments[i]) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::InvalidInput(format!(
            "cannot derive file identifier from URL {}",
            source_url
        ))),
    }
}

/// Direct download URL: `prefix` followed by the remote file identifier
pub fn download_url(prefix: &str, source_url: &str) -> Result<String> {
    Ok(format!("{}{}", prefix, remote_file_id(source_url)?))
}

/// Blocking HTTP(S) fetcher
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("cnncls/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::backend(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::backend(format!("download request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend(format!("download from {} returned {}", url, status)));
        }

        ensure_parent_dir(destination)?;
        let mut file = File::create(destination)?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|e| Error::backend(format!("download from {} interrupted: {}", url, e)))?;

        tracing::debug!(url, bytes, destination = %destination.display(), "Archive fetched");
        Ok(bytes)
    }
}
