//! Collaborator adapters used by the stages

pub mod extractor;
pub mod fetcher;
pub mod tracking;

pub use extractor::{ArchiveExtractor, ZipExtractor};
pub use fetcher::{remote_file_id, ArchiveFetcher, HttpFetcher};
pub use tracking::{connect, FileTracker, MlflowRestClient, RunInfo, RunStatus, TrackingClient, TrackingStore};
