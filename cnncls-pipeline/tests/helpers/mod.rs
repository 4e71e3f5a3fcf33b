//! Test Helper Utilities
//!
//! Shared utilities for testing cnncls-pipeline

#![allow(dead_code)]

pub mod dataset;
pub mod fakes;
pub mod http_stub;

pub use dataset::{build_dataset_zip, write_class_images, write_documents, Workspace};
pub use fakes::{FailingFetcher, LocalFetcher, PlanRecordingBackend, RecordingTracker, TrackerCall};
pub use http_stub::StubServer;
