//! Logging context
//!
//! Binaries call [`LoggingContext::init`] once at startup and keep the returned
//! context alive for the process lifetime. Events go to stdout and to an
//! append-only log file; dropping the context flushes the file.

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where and how verbosely to log
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub file_name: String,
    /// Filter used when `RUST_LOG` is unset
    pub default_directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            file_name: "running_logs.log".to_string(),
            default_directive: "info".to_string(),
        }
    }
}

/// Installed subscriber plus its file sink
pub struct LoggingContext {
    file: Arc<File>,
    path: PathBuf,
}

impl LoggingContext {
    /// Open the log sink and install the global subscriber
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;
        let path = config.log_dir.join(&config.file_name);
        let file = Arc::new(OpenOptions::new().create(true).append(true).open(&path)?);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(file.clone()))
            .try_init()
            .map_err(|e| Error::InvalidInput(format!("logging already initialized: {}", e)))?;

        tracing::info!(log_file = %path.display(), "Logging initialized");
        Ok(Self { file, path })
    }

    pub fn log_file(&self) -> &Path {
        &self.path
    }

    /// Flush buffered file output to disk
    pub fn flush(&self) -> Result<()> {
        (&*self.file).flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for LoggingContext {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Failed to flush log file {}: {}", self.path.display(), e);
        }
    }
}
