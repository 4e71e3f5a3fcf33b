//! # CNN Classifier Common Library
//!
//! Shared code for the training pipeline and the inference service:
//! - Error taxonomy and `Result` alias
//! - Configuration documents and the per-run configuration resolver
//! - Per-stage configuration entities
//! - Artifact directory management and JSON side files
//! - Logging context

pub mod config;
pub mod entity;
pub mod error;
pub mod fs;
pub mod logging;

pub use config::ConfigResolver;
pub use error::{Error, Result};
