//! Prediction service
//!
//! **Responsibilities:**
//! - Load the trained model once per process and share it read-only
//! - Decode base64 request images and map the arg-max class to a label
//!
//! The model is loaded on the first prediction, so the service can start
//! before a model has been trained. It is never reloaded afterwards.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cnncls_common::{Error, Result};
use cnncls_pipeline::backend::{Model, ModelBackend};
use cnncls_pipeline::data::{tensor_from_bytes, Interpolation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// `(height, width)` every request image is resized to
pub const INPUT_SIZE: (u32, u32) = (224, 224);

pub const NORMAL_LABEL: &str = "Normal";
pub const CANCER_LABEL: &str = "Adenocarcinoma Cancer";

/// One entry of the prediction response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub image: String,
}

/// Class index 1 is the normal class; any other index is reported as cancer
pub fn label_for(index: usize) -> &'static str {
    if index == 1 {
        NORMAL_LABEL
    } else {
        CANCER_LABEL
    }
}

/// Decode a standard-alphabet base64 payload
pub fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::InvalidInput(format!("image is not valid base64: {}", e)))
}

/// Encode raw bytes as standard-alphabet base64
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Whether request images resized to [`INPUT_SIZE`] fit the model input
pub fn accepts_request_size(model: &Model) -> bool {
    model.input_shape.target_size() == INPUT_SIZE
}

pub struct PredictionService {
    backend: Arc<dyn ModelBackend>,
    model_path: PathBuf,
    model: OnceLock<Arc<Model>>,
}

impl PredictionService {
    pub fn new(backend: Arc<dyn ModelBackend>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            model_path: model_path.into(),
            model: OnceLock::new(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// The shared model, loading it on first use
    pub fn model(&self) -> Result<Arc<Model>> {
        if let Some(model) = self.model.get() {
            return Ok(model.clone());
        }

        let loaded = self.backend.load(&self.model_path)?;
        if !accepts_request_size(&loaded) {
            warn!(
                input_shape = ?loaded.input_shape,
                "Model input is not {}x{}; every prediction will fail on shape mismatch",
                INPUT_SIZE.0,
                INPUT_SIZE.1
            );
        }
        match loaded.output_units() {
            Some(2) => {}
            units => warn!(
                ?units,
                "Model output is not two classes; labels assume index 1 is {}", NORMAL_LABEL
            ),
        }
        info!(
            path = %self.model_path.display(),
            layers = loaded.layers.len(),
            "Prediction model loaded"
        );
        Ok(self.model.get_or_init(|| Arc::new(loaded)).clone())
    }

    /// Classify one base64-encoded image
    pub fn predict(&self, image_base64: &str) -> Result<Vec<Prediction>> {
        let model = self.model()?;
        let bytes = decode_image(image_base64)?;
        let input = tensor_from_bytes(
            &bytes,
            INPUT_SIZE,
            model.input_shape.channels,
            Interpolation::Nearest,
            1.0,
        )?;

        let probabilities = self.backend.predict(&model, &input)?;
        let index = argmax(&probabilities)
            .ok_or_else(|| Error::backend("model produced no class scores"))?;
        let label = label_for(index);
        info!(class_index = index, label, "Prediction made");

        Ok(vec![Prediction {
            image: label.to_string(),
        }])
    }
}
