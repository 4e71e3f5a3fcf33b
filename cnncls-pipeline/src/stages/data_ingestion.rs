//! Data ingestion: download the dataset archive and unpack it

use crate::services::fetcher::download_url;
use crate::services::{ArchiveExtractor, ArchiveFetcher};
use cnncls_common::entity::DataIngestionConfig;
use cnncls_common::fs::{ensure_directories, file_size_label};
use cnncls_common::Result;
use std::sync::Arc;
use tracing::{error, info};

pub struct DataIngestion {
    config: DataIngestionConfig,
    fetcher: Arc<dyn ArchiveFetcher>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl DataIngestion {
    pub fn new(
        config: DataIngestionConfig,
        fetcher: Arc<dyn ArchiveFetcher>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
        }
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    /// Fetch `prefix + <file id>` into `local_data_file`
    pub fn download(&self) -> Result<()> {
        let cfg = &self.config;
        let outcome = ensure_directories(&[&cfg.root_dir])
            .and_then(|_| download_url(&cfg.prefix, &cfg.source_url))
            .and_then(|url| {
                info!(
                    "Downloading data from {} into file {}",
                    cfg.source_url,
                    cfg.local_data_file.display()
                );
                self.fetcher.fetch(&url, &cfg.local_data_file)
            });

        match outcome {
            Ok(bytes) => {
                let size = file_size_label(&cfg.local_data_file)
                    .unwrap_or_else(|_| format!("{} bytes", bytes));
                info!(
                    bytes,
                    "Downloaded data from {} into file {} ({})",
                    cfg.source_url,
                    cfg.local_data_file.display(),
                    size
                );
                Ok(())
            }
            Err(e) => {
                error!(source_url = %cfg.source_url, "Failed to download data: {}", e);
                Err(e)
            }
        }
    }

    /// Unpack `local_data_file` into `unzip_dir`
    pub fn extract(&self) -> Result<()> {
        let cfg = &self.config;
        let outcome = ensure_directories(&[&cfg.unzip_dir])
            .and_then(|_| self.extractor.extract(&cfg.local_data_file, &cfg.unzip_dir));

        match outcome {
            Ok(entries) => {
                info!(
                    entries,
                    "Extracted data from {} into {}",
                    cfg.local_data_file.display(),
                    cfg.unzip_dir.display()
                );
                Ok(())
            }
            Err(e) => {
                error!(archive = %cfg.local_data_file.display(), "Failed to extract data: {}", e);
                Err(e)
            }
        }
    }

    pub fn run(&self) -> Result<()> {
        self.download()?;
        self.extract()
    }
}
