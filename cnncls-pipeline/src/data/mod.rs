//! Image batches for training, validation and inference
//!
//! **Responsibilities:**
//! - Decode image files into `ImageTensor`s (HWC, f32)
//! - Split a class-per-subdirectory dataset into training/validation subsets
//! - Serve fixed-size batches through the [`BatchSource`] trait

pub mod augment;
pub mod generator;

pub use augment::Augmentation;
pub use generator::{DirectoryFlow, FlowConfig, ImageDataGenerator, Subset};

use cnncls_common::{Error, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// File extensions recognised as images when scanning class directories
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Dense image in height-width-channel order
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Convert a decoded image to `channels` (1 or 3), multiplying every sample by `scale`
    pub fn from_image(image: &DynamicImage, channels: u32, scale: f32) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        let data: Vec<f32> = match channels {
            3 => image
                .to_rgb8()
                .into_raw()
                .into_iter()
                .map(|v| v as f32 * scale)
                .collect(),
            1 => image
                .to_luma8()
                .into_raw()
                .into_iter()
                .map(|v| v as f32 * scale)
                .collect(),
            other => {
                return Err(Error::InvalidInput(format!(
                    "unsupported channel count {}",
                    other
                )))
            }
        };
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    pub fn get(&self, y: u32, x: u32, c: u32) -> f32 {
        let idx = ((y * self.width + x) * self.channels + c) as usize;
        self.data[idx]
    }
}

/// One mini-batch with integer class labels
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub images: Vec<ImageTensor>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Cycling source of labelled batches
///
/// Sources never exhaust: after the last batch of a pass the next call starts
/// a new pass (reshuffled if the source shuffles).
pub trait BatchSource: Send {
    /// Total samples in one pass
    fn samples(&self) -> usize;

    fn batch_size(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Batches needed to cover every sample once (last batch may be short)
    fn batches_per_pass(&self) -> usize {
        let batch = self.batch_size().max(1);
        (self.samples() + batch - 1) / batch
    }

    fn next_batch(&mut self) -> Result<Batch>;

    /// Rewind to the start of a pass
    fn reset(&mut self);
}

/// Resampling filter used when resizing to the target size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl Interpolation {
    pub fn filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Decode `bytes`, resize to `(height, width)` and convert to a tensor
pub fn tensor_from_bytes(
    bytes: &[u8],
    target: (u32, u32),
    channels: u32,
    interpolation: Interpolation,
    scale: f32,
) -> Result<ImageTensor> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidInput(format!("cannot decode image: {}", e)))?;
    let (height, width) = target;
    let resized = image.resize_exact(width, height, interpolation.filter());
    ImageTensor::from_image(&resized, channels, scale)
}

pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
