//! Native CPU backend
//!
//! Implements transfer learning without an external tensor runtime:
//! - The convolutional base is a fixed feature extractor: each channel is
//!   average-pooled onto a 7x7 grid, matching the spatial size of the VGG16
//!   `block5_pool` output for 224x224 inputs
//! - The dense softmax head is trained with plain mini-batch SGD on
//!   categorical cross-entropy
//! - Models persist as JSON through the default trait methods

use super::vgg16::vgg16;
use super::{CompileOptions, EpochStats, FitPlan, Fitted, Model, ModelBackend, PretrainedSpec, Score};
use crate::data::{Batch, BatchSource, ImageTensor};
use cnncls_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Side length of the pooled feature grid
pub const FEATURE_GRID: u32 = 7;

/// Probability floor inside the log of the cross-entropy
const EPSILON: f32 = 1e-7;

#[derive(Debug, Clone)]
pub struct NativeBackend {
    seed: u64,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed used for head weight initialization
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }
}

/// Dense head view: index in `model.layers`, units and input width
struct Head {
    index: usize,
    units: usize,
    features: usize,
}

impl Head {
    fn locate(model: &Model) -> Result<Self> {
        let dense: Vec<usize> = model
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.dense_units().is_some())
            .map(|(i, _)| i)
            .collect();

        let index = match dense.as_slice() {
            [only] if *only == model.layers.len() - 1 => *only,
            [] => return Err(Error::backend("model has no dense classifier head")),
            _ => {
                return Err(Error::backend(format!(
                    "native backend supports a single trailing dense layer, found {}",
                    dense.len()
                )))
            }
        };
        let units = model.layers[index].dense_units().unwrap_or(0);
        let grid = FEATURE_GRID as usize;
        Ok(Self {
            index,
            units,
            features: grid * grid * model.input_shape.channels as usize,
        })
    }

    fn weight_len(&self) -> usize {
        self.units * self.features + self.units
    }
}

impl ModelBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn pretrained(&self, spec: &PretrainedSpec) -> Result<Model> {
        if spec.include_top {
            return Err(Error::backend(
                "native backend cannot build the ImageNet classifier top; set INCLUDE_TOP to false",
            ));
        }
        if !spec.weights.is_empty() && !spec.weights.eq_ignore_ascii_case("none") {
            tracing::warn!(
                weights = %spec.weights,
                "Pretrained convolution weights are not bundled; base layers act as a pooling extractor"
            );
        }
        Ok(vgg16(spec.input_shape, false))
    }

    fn compile(&self, mut model: Model, options: CompileOptions) -> Result<Model> {
        let head = Head::locate(&model)?;
        let layer = &mut model.layers[head.index];

        if layer.weights.is_empty() {
            let limit = (6.0 / (head.features + head.units) as f32).sqrt();
            let mut rng = StdRng::seed_from_u64(self.seed);
            let mut weights: Vec<f32> = (0..head.units * head.features)
                .map(|_| rng.gen_range(-limit..limit))
                .collect();
            weights.extend(std::iter::repeat(0.0).take(head.units));
            layer.weights = weights;
        } else if layer.weights.len() != head.weight_len() {
            return Err(Error::backend(format!(
                "layer {} holds {} weights, expected {}",
                layer.name,
                layer.weights.len(),
                head.weight_len()
            )));
        }

        model.compile = Some(options);
        Ok(model)
    }

    fn fit(
        &self,
        mut model: Model,
        train: &mut dyn BatchSource,
        validation: &mut dyn BatchSource,
        plan: &FitPlan,
    ) -> Result<Fitted> {
        let options = model
            .compile
            .clone()
            .ok_or_else(|| Error::backend("model must be compiled before fitting"))?;
        let head = Head::locate(&model)?;
        check_weights(&model, &head)?;

        let learning_rate = options.learning_rate() as f32;
        let trainable = model.layers[head.index].trainable;
        if !trainable {
            tracing::warn!(layer = %model.layers[head.index].name, "Classifier head is frozen; weights will not change");
        }

        let mut history = Vec::with_capacity(plan.epochs);
        for epoch in 1..=plan.epochs {
            let mut totals = Totals::default();
            for _ in 0..plan.steps_per_epoch {
                let batch = train.next_batch()?;
                let weights = &mut model.layers[head.index].weights;
                let mut grads = vec![0.0f32; weights.len()];
                let step = accumulate(weights, &head, model.input_shape, &batch, Some(&mut grads))?;
                if trainable && step.seen > 0 {
                    let scale = learning_rate / step.seen as f32;
                    for (w, g) in weights.iter_mut().zip(&grads) {
                        *w -= scale * g;
                    }
                }
                totals.merge(step);
            }

            let mut val_totals = Totals::default();
            if plan.validation_steps > 0 {
                validation.reset();
                let weights = &model.layers[head.index].weights;
                for _ in 0..plan.validation_steps {
                    let batch = validation.next_batch()?;
                    val_totals.merge(accumulate(weights, &head, model.input_shape, &batch, None)?);
                }
            }

            let stats = EpochStats {
                epoch,
                loss: totals.loss(),
                accuracy: totals.accuracy(),
                val_loss: (val_totals.seen > 0).then(|| val_totals.loss()),
                val_accuracy: (val_totals.seen > 0).then(|| val_totals.accuracy()),
            };
            tracing::info!(
                epoch,
                epochs = plan.epochs,
                loss = stats.loss,
                accuracy = stats.accuracy,
                val_loss = ?stats.val_loss,
                val_accuracy = ?stats.val_accuracy,
                "Epoch complete"
            );
            history.push(stats);
        }

        Ok(Fitted { model, history })
    }

    fn evaluate(&self, model: &Model, data: &mut dyn BatchSource) -> Result<Score> {
        let head = Head::locate(model)?;
        check_weights(model, &head)?;
        if data.samples() == 0 {
            return Err(Error::InvalidInput("no samples to evaluate".to_string()));
        }

        data.reset();
        let weights = &model.layers[head.index].weights;
        let mut totals = Totals::default();
        for _ in 0..data.batches_per_pass() {
            let batch = data.next_batch()?;
            totals.merge(accumulate(weights, &head, model.input_shape, &batch, None)?);
        }

        Ok(Score {
            loss: totals.loss(),
            accuracy: totals.accuracy(),
        })
    }

    fn predict(&self, model: &Model, input: &ImageTensor) -> Result<Vec<f32>> {
        let head = Head::locate(model)?;
        check_weights(model, &head)?;
        check_shape(model, input)?;
        let features = pooled_features(input, FEATURE_GRID);
        Ok(forward(&model.layers[head.index].weights, &head, &features))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl Totals {
    fn merge(&mut self, other: Totals) {
        self.loss_sum += other.loss_sum;
        self.correct += other.correct;
        self.seen += other.seen;
    }

    fn loss(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.loss_sum / self.seen as f64
        }
    }

    fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct as f64 / self.seen as f64
        }
    }
}

fn check_weights(model: &Model, head: &Head) -> Result<()> {
    let layer = &model.layers[head.index];
    if layer.weights.len() != head.weight_len() {
        return Err(Error::backend(format!(
            "layer {} is not initialized ({} of {} weights); compile the model first",
            layer.name,
            layer.weights.len(),
            head.weight_len()
        )));
    }
    Ok(())
}

fn check_shape(model: &Model, input: &ImageTensor) -> Result<()> {
    let shape = model.input_shape;
    if (input.height, input.width, input.channels) != (shape.height, shape.width, shape.channels) {
        return Err(Error::InvalidInput(format!(
            "input shape [{}, {}, {}] does not match model input {:?}",
            input.height,
            input.width,
            input.channels,
            <[u32; 3]>::from(shape)
        )));
    }
    Ok(())
}

/// Forward a batch, summing loss and correct predictions; adds gradients when requested
fn accumulate(
    weights: &[f32],
    head: &Head,
    shape: cnncls_common::entity::ImageSize,
    batch: &Batch,
    mut grads: Option<&mut Vec<f32>>,
) -> Result<Totals> {
    let mut totals = Totals::default();
    let bias_offset = head.units * head.features;

    for (image, &label) in batch.images.iter().zip(&batch.labels) {
        if label >= head.units {
            return Err(Error::InvalidInput(format!(
                "class index {} exceeds head units {}",
                label, head.units
            )));
        }
        if (image.height, image.width, image.channels) != (shape.height, shape.width, shape.channels) {
            return Err(Error::InvalidInput(format!(
                "batch image [{}, {}, {}] does not match model input",
                image.height, image.width, image.channels
            )));
        }

        let x = pooled_features(image, FEATURE_GRID);
        let probs = forward(weights, head, &x);

        totals.loss_sum -= f64::from(probs[label].max(EPSILON).ln());
        if argmax(&probs) == label {
            totals.correct += 1;
        }
        totals.seen += 1;

        if let Some(grads) = grads.as_deref_mut() {
            for (unit, p) in probs.iter().enumerate() {
                let delta = if unit == label { p - 1.0 } else { *p };
                let row = &mut grads[unit * head.features..(unit + 1) * head.features];
                for (g, xi) in row.iter_mut().zip(&x) {
                    *g += delta * xi;
                }
                grads[bias_offset + unit] += delta;
            }
        }
    }
    Ok(totals)
}

/// Softmax of `W x + b`
fn forward(weights: &[f32], head: &Head, x: &[f32]) -> Vec<f32> {
    let bias_offset = head.units * head.features;
    let logits: Vec<f32> = (0..head.units)
        .map(|unit| {
            let row = &weights[unit * head.features..(unit + 1) * head.features];
            row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f32>() + weights[bias_offset + unit]
        })
        .collect();

    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
        .0
}

/// Adaptive average pool of each channel onto a `grid x grid` lattice, ordered (row, col, channel)
fn pooled_features(image: &ImageTensor, grid: u32) -> Vec<f32> {
    let (h, w, c) = (image.height, image.width, image.channels);
    let mut out = Vec::with_capacity((grid * grid * c) as usize);

    for gy in 0..grid {
        let y0 = gy * h / grid;
        let y1 = ((gy + 1) * h + grid - 1) / grid;
        for gx in 0..grid {
            let x0 = gx * w / grid;
            let x1 = ((gx + 1) * w + grid - 1) / grid;
            let area = ((y1 - y0) * (x1 - x0)).max(1) as f32;
            for ch in 0..c {
                let mut sum = 0.0f32;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += image.get(y, x, ch);
                    }
                }
                out.push(sum / area);
            }
        }
    }
    out
}
