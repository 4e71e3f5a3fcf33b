//! Per-stage configuration entities
//!
//! Each record is built fresh by [`crate::ConfigResolver`] and handed by value to
//! the stage that consumes it. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Image shape as `[height, width, channels]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 3]", into = "[u32; 3]")]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl ImageSize {
    pub const fn new(height: u32, width: u32, channels: u32) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Spatial size `(height, width)` without the channel axis
    pub fn target_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Number of scalar values in one image
    pub fn volume(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }
}

impl From<[u32; 3]> for ImageSize {
    fn from(v: [u32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<ImageSize> for [u32; 3] {
    fn from(s: ImageSize) -> Self {
        [s.height, s.width, s.channels]
    }
}

/// Which base-model layers are excluded from gradient updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezePolicy {
    /// Every base layer is frozen
    All,
    /// All base layers except the trailing `n` are frozen
    AllButLast(usize),
    /// Base layers keep their instantiated trainability
    None,
}

impl FreezePolicy {
    /// `freeze_all` wins over `freeze_till`; a trailing count of zero freezes nothing
    pub fn from_flags(freeze_all: bool, freeze_till: Option<usize>) -> Self {
        match (freeze_all, freeze_till) {
            (true, _) => FreezePolicy::All,
            (false, Some(n)) if n > 0 => FreezePolicy::AllButLast(n),
            _ => FreezePolicy::None,
        }
    }
}

/// Data ingestion stage configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataIngestionConfig {
    pub root_dir: PathBuf,
    pub source_url: String,
    pub local_data_file: PathBuf,
    pub unzip_dir: PathBuf,
    pub prefix: String,
}

/// Base model preparation stage configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseModelConfig {
    pub root_dir: PathBuf,
    pub base_model_path: PathBuf,
    pub updated_base_model_path: PathBuf,
    pub image_size: ImageSize,
    pub learning_rate: f64,
    pub include_top: bool,
    pub weights: String,
    pub classes: usize,
    pub freeze_policy: FreezePolicy,
}

/// Model training stage configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTrainerConfig {
    pub root_dir: PathBuf,
    pub trained_model_file_path: PathBuf,
    pub updated_base_model_path: PathBuf,
    /// Extracted dataset directory, discovered at resolution time
    pub data_path: PathBuf,
    pub image_size: ImageSize,
    pub epochs: usize,
    pub batch_size: usize,
    pub augmentation: bool,
}

/// Model evaluation stage configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEvaluationConfig {
    pub root_dir: PathBuf,
    pub model_path: PathBuf,
    pub data_path: PathBuf,
    /// Full parameter set, logged verbatim to the tracking run
    pub params: BTreeMap<String, String>,
    pub mlflow_uri: String,
    pub image_size: ImageSize,
    pub batch_size: usize,
}
