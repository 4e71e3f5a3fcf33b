//! Directory-backed image generator
//!
//! Expects one subdirectory per class under the dataset root. Class indices
//! follow the sorted subdirectory names. Within each class the sorted file list
//! is split deterministically: the first `floor(n * validation_split)` files
//! form the validation subset, the remainder the training subset.

use super::{Augmentation, Batch, BatchSource, ImageTensor, Interpolation};
use cnncls_common::{Error, Result};
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Sample transformation settings shared by every flow built from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDataGenerator {
    pub rescale: f32,
    pub validation_split: f64,
    pub augmentation: Option<Augmentation>,
}

impl ImageDataGenerator {
    pub fn new(rescale: f32, validation_split: f64) -> Self {
        Self {
            rescale,
            validation_split,
            augmentation: None,
        }
    }

    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = Some(augmentation);
        self
    }

    /// Scan `directory` and build a flow over the requested subset
    pub fn flow_from_directory(&self, directory: &Path, config: FlowConfig) -> Result<DirectoryFlow> {
        if config.batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::InvalidInput(format!(
                "validation split {} outside [0, 1)",
                self.validation_split
            )));
        }

        let classes = class_directories(directory)?;
        let mut files = Vec::new();
        for (index, class_dir) in classes.iter().enumerate() {
            let class_files = image_files(class_dir);
            let split = (class_files.len() as f64 * self.validation_split).floor() as usize;
            let selected = match config.subset {
                Subset::Validation => &class_files[..split],
                Subset::Training => &class_files[split..],
            };
            files.extend(selected.iter().cloned().map(|path| (path, index)));
        }

        let class_names = classes
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();

        tracing::info!(
            directory = %directory.display(),
            subset = ?config.subset,
            images = files.len(),
            classes = class_names.len(),
            "Found images"
        );

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut flow = DirectoryFlow {
            generator: self.clone(),
            config,
            class_names,
            order: (0..files.len()).collect(),
            files,
            cursor: 0,
            rng,
        };
        flow.start_pass();
        Ok(flow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    Training,
    Validation,
}

/// Per-flow iteration settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowConfig {
    /// `(height, width)` every image is resized to
    pub target_size: (u32, u32),
    pub channels: u32,
    pub batch_size: usize,
    pub interpolation: Interpolation,
    pub subset: Subset,
    pub shuffle: bool,
    pub seed: Option<u64>,
}

/// Batches over one subset of a class-per-directory dataset
pub struct DirectoryFlow {
    generator: ImageDataGenerator,
    config: FlowConfig,
    class_names: Vec<String>,
    files: Vec<(PathBuf, usize)>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl DirectoryFlow {
    pub fn generator(&self) -> &ImageDataGenerator {
        &self.generator
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Files in this subset with their class index, in scan order
    pub fn files(&self) -> &[(PathBuf, usize)] {
        &self.files
    }

    fn start_pass(&mut self) {
        self.cursor = 0;
        if self.config.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    fn load(&mut self, path: &Path) -> Result<ImageTensor> {
        let image = image::open(path)
            .map_err(|e| Error::backend(format!("cannot read image {}: {}", path.display(), e)))?;
        let (height, width) = self.config.target_size;
        let mut image = image.resize_exact(width, height, self.config.interpolation.filter());

        if let Some(augmentation) = &self.generator.augmentation {
            let augmented = augmentation.apply(&image.to_rgb8(), &mut self.rng);
            image = DynamicImage::ImageRgb8(augmented);
        }

        ImageTensor::from_image(&image, self.config.channels, self.generator.rescale)
    }
}

impl BatchSource for DirectoryFlow {
    fn samples(&self) -> usize {
        self.files.len()
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    fn next_batch(&mut self) -> Result<Batch> {
        if self.files.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no {:?} images to draw a batch from",
                self.config.subset
            )));
        }
        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let end = (self.cursor + self.config.batch_size).min(self.order.len());
        let picks: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let mut batch = Batch::default();
        for index in picks {
            let (path, label) = self.files[index].clone();
            batch.images.push(self.load(&path)?);
            batch.labels.push(label);
        }
        Ok(batch)
    }

    fn reset(&mut self) {
        self.start_pass();
    }
}

/// Sorted, non-hidden class subdirectories of `directory`
fn class_directories(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(Error::artifact_not_found(directory, "dataset directory does not exist"));
    }
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_dir() && !hidden {
            classes.push(entry.path());
        }
    }
    classes.sort();
    Ok(classes)
}

/// Image files below `class_dir`, sorted by path
fn image_files(class_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(class_dir).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() && super::is_image_file(entry.path()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Error accessing entry: {}", e),
        }
    }
    files.sort();
    files
}
