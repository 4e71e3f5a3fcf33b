//! Backend-neutral model graph
//!
//! A `Model` is the persisted form every backend reads and writes: an ordered
//! layer list with per-layer trainability, optional dense weights, and the
//! compile options attached by [`super::ModelBackend::compile`].

use cnncls_common::entity::{FreezePolicy, ImageSize};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    Input,
    Conv2d {
        filters: u32,
        kernel_size: u32,
        activation: Activation,
    },
    MaxPool2d {
        pool_size: u32,
    },
    Flatten,
    Dense {
        units: usize,
        activation: Activation,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub trainable: bool,
    /// Row-major kernel followed by bias; empty until a backend allocates it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<f32>,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            trainable: true,
            weights: Vec::new(),
        }
    }

    pub fn dense_units(&self) -> Option<usize> {
        match self.kind {
            LayerKind::Dense { units, .. } => Some(units),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Optimizer {
    Sgd { learning_rate: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    CategoricalCrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub metrics: Vec<Metric>,
}

impl CompileOptions {
    /// SGD at `learning_rate`, categorical cross-entropy, accuracy
    pub fn sgd_categorical(learning_rate: f64) -> Self {
        Self {
            optimizer: Optimizer::Sgd { learning_rate },
            loss: Loss::CategoricalCrossEntropy,
            metrics: vec![Metric::Accuracy],
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self.optimizer {
            Optimizer::Sgd { learning_rate } => learning_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub input_shape: ImageSize,
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileOptions>,
}

impl Model {
    pub fn new(name: impl Into<String>, input_shape: ImageSize, layers: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            input_shape,
            layers,
            compile: None,
        }
    }

    /// Apply a freeze policy to every current layer
    ///
    /// `AllButLast(k)` freezes `layers[..len - k]` and leaves the trailing `k`
    /// untouched; a `k` at or beyond the layer count freezes nothing.
    pub fn apply_freeze_policy(&mut self, policy: FreezePolicy) {
        match policy {
            FreezePolicy::All => {
                for layer in &mut self.layers {
                    layer.trainable = false;
                }
            }
            FreezePolicy::AllButLast(keep) => {
                let cut = self.layers.len().saturating_sub(keep);
                for layer in &mut self.layers[..cut] {
                    layer.trainable = false;
                }
            }
            FreezePolicy::None => {}
        }
    }

    /// Append a flatten transform and a softmax dense head with `classes` units
    pub fn with_classifier_head(mut self, classes: usize) -> Self {
        self.layers.push(Layer::new("flatten", LayerKind::Flatten));
        self.layers.push(Layer::new(
            "dense",
            LayerKind::Dense {
                units: classes,
                activation: Activation::Softmax,
            },
        ));
        self.compile = None;
        self
    }

    /// Units of the final dense layer
    pub fn output_units(&self) -> Option<usize> {
        self.layers.iter().rev().find_map(Layer::dense_units)
    }

    pub fn trainable_count(&self) -> usize {
        self.layers.iter().filter(|l| l.trainable).count()
    }

    pub fn frozen_count(&self) -> usize {
        self.layers.len() - self.trainable_count()
    }

    /// One line per layer: name, kind, trainability
    pub fn summary(&self) -> String {
        let mut out = format!("Model: {} (input {:?})\n", self.name, <[u32; 3]>::from(self.input_shape));
        for layer in &self.layers {
            let kind = match &layer.kind {
                LayerKind::Input => "Input".to_string(),
                LayerKind::Conv2d { filters, kernel_size, .. } => {
                    format!("Conv2D({}, {}x{})", filters, kernel_size, kernel_size)
                }
                LayerKind::MaxPool2d { pool_size } => format!("MaxPool2D({})", pool_size),
                LayerKind::Flatten => "Flatten".to_string(),
                LayerKind::Dense { units, activation } => {
                    format!("Dense({}, {:?})", units, activation)
                }
            };
            out.push_str(&format!(
                "  {:<16} {:<24} trainable={}\n",
                layer.name, kind, layer.trainable
            ));
        }
        out.push_str(&format!(
            "Layers: {} trainable, {} frozen",
            self.trainable_count(),
            self.frozen_count()
        ));
        out
    }
}
