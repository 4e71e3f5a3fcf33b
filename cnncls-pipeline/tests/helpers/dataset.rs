//! Synthetic datasets and configuration documents

use image::{Rgb, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Name of the top-level directory inside the dataset archive
pub const DATASET_DIR: &str = "Chest-CT-Scan-data";

/// Scratch directory holding config/params documents and the artifacts tree
pub struct Workspace {
    pub temp: TempDir,
    pub config: PathBuf,
    pub params: PathBuf,
}

impl Workspace {
    /// Documents with small images, `epochs` epochs and a file tracking store
    pub fn new(augmentation: bool, epochs: usize) -> Self {
        let temp = TempDir::new().unwrap();
        let (config, params) = write_documents(temp.path(), augmentation, epochs, false);
        Self { temp, config, params }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn artifacts(&self) -> PathBuf {
        self.temp.path().join("artifacts")
    }
}

/// Write config + params documents rooted at `root`; returns their paths
pub fn write_documents(root: &Path, augmentation: bool, epochs: usize, include_top: bool) -> (PathBuf, PathBuf) {
    let a = root.join("artifacts");
    let config = format!(
        "artifacts_root: {a}
data_ingestion:
  root_dir: {a}/data_ingestion
  source_url: https://drive.google.com/file/d/FILE123/view?usp=sharing
  local_data_file: {a}/data_ingestion/data.zip
  unzip_dir: {a}/data_ingestion
  prefix: https://drive.google.com/uc?/export=download&id=
prepare_base_model:
  root_dir: {a}/prepare_base_model
  base_model_path: {a}/prepare_base_model/base_model.json
  updated_base_model_path: {a}/prepare_base_model/base_model_updated.json
model_trainer:
  root_dir: {a}/model_trainer
  trained_model_file_path: {a}/model_trainer/model.json
model_evaluation:
  root_dir: {a}/model_evaluation
  mlflow_uri: file:{m}
",
        a = a.display(),
        m = root.join("mlruns").display(),
    );
    let params = format!(
        "AUGMENTATION: {augmentation}
IMAGE_SIZE: [16, 16, 3]
BATCH_SIZE: 4
INCLUDE_TOP: {include_top}
EPOCHS: {epochs}
CLASSES: 2
WEIGHTS: imagenet
LEARNING_RATE: 0.01
"
    );

    let config_path = root.join("config.yaml");
    let params_path = root.join("params.yaml");
    std::fs::write(&config_path, config).unwrap();
    std::fs::write(&params_path, params).unwrap();
    (config_path, params_path)
}

/// Write `count` solid-colour PNGs into `dir/class`
pub fn write_class_images(dir: &Path, class: &str, count: usize, color: [u8; 3]) {
    let class_dir = dir.join(class);
    std::fs::create_dir_all(&class_dir).unwrap();
    for i in 0..count {
        let shade = (i % 16) as u8;
        RgbImage::from_pixel(8, 8, Rgb([color[0].saturating_sub(shade), color[1], color[2]]))
            .save(class_dir.join(format!("scan_{:04}.png", i)))
            .unwrap();
    }
}

/// Zip a two-class dataset of `per_class` images under [`DATASET_DIR`]
pub fn build_dataset_zip(path: &Path, per_class: usize) {
    let staging = TempDir::new().unwrap();
    let root = staging.path().join(DATASET_DIR);
    write_class_images(&root, "adenocarcinoma", per_class, [220, 40, 40]);
    write_class_images(&root, "normal", per_class, [40, 40, 220]);

    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for class in ["adenocarcinoma", "normal"] {
        let mut entries: Vec<_> = std::fs::read_dir(root.join(class))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        for entry in entries {
            let name = format!(
                "{}/{}/{}",
                DATASET_DIR,
                class,
                entry.file_name().unwrap().to_string_lossy()
            );
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(&std::fs::read(&entry).unwrap()).unwrap();
        }
    }
    writer.finish().unwrap();
}
