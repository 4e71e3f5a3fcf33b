//! Model backend abstraction
//!
//! Stages never touch tensors or weights directly; they drive a
//! [`ModelBackend`] that can instantiate the pretrained architecture, compile,
//! persist, fit, evaluate and predict. [`NativeBackend`] is the built-in CPU
//! implementation.

pub mod model;
pub mod native;
pub mod vgg16;

pub use model::{Activation, CompileOptions, Layer, LayerKind, Loss, Metric, Model, Optimizer};
pub use native::NativeBackend;

use crate::data::{BatchSource, ImageTensor};
use cnncls_common::entity::ImageSize;
use cnncls_common::fs::{load_json, save_json};
use cnncls_common::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Request for the pretrained base architecture
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainedSpec {
    pub input_shape: ImageSize,
    pub include_top: bool,
    /// Weight source name, e.g. `imagenet`
    pub weights: String,
}

/// Training schedule for [`ModelBackend::fit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitPlan {
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
}

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Fitted {
    pub model: Model,
    pub history: Vec<EpochStats>,
}

/// Evaluation result; serializes to exactly `{"loss", "accuracy"}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub loss: f64,
    pub accuracy: f64,
}

pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Instantiate the pretrained base architecture
    fn pretrained(&self, spec: &PretrainedSpec) -> Result<Model>;

    /// Attach optimizer, loss and metrics, allocating weights as needed
    fn compile(&self, model: Model, options: CompileOptions) -> Result<Model>;

    /// Read a persisted model; missing files yield `ArtifactNotFound`
    fn load(&self, path: &Path) -> Result<Model> {
        load_json(path)
    }

    /// Persist a model, replacing any existing file
    fn save(&self, path: &Path, model: &Model) -> Result<()> {
        save_json(path, model)
    }

    fn fit(
        &self,
        model: Model,
        train: &mut dyn BatchSource,
        validation: &mut dyn BatchSource,
        plan: &FitPlan,
    ) -> Result<Fitted>;

    /// Loss and accuracy over one full pass of `data`
    fn evaluate(&self, model: &Model, data: &mut dyn BatchSource) -> Result<Score>;

    /// Class probabilities for one image
    fn predict(&self, model: &Model, input: &ImageTensor) -> Result<Vec<f32>>;
}
