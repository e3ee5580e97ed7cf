//! Trained model bundle
//!
//! Loads the two ONNX classifiers and their training metadata from a
//! bundle directory and runs inference. The metadata is the contract
//! between training and serving: feature column order, fill values and
//! the training provenance fields all come from it.

use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};

const TOP10_MODEL_FILE: &str = "top10_classifier.onnx";
const TOP3_MODEL_FILE: &str = "top3_classifier.onnx";
const METADATA_FILE: &str = "model_metadata.json";

/// Training-time metadata persisted alongside the ONNX files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Expanded feature columns in exact training order.
    pub features: Vec<String>,
    #[serde(default)]
    pub numeric_features: Vec<String>,
    #[serde(default)]
    pub categorical_features: Vec<String>,
    /// Per-column substitutes for null feature values.
    #[serde(default)]
    pub fill_values: HashMap<String, f64>,
    #[serde(default)]
    pub top10_accuracy: Option<f64>,
    #[serde(default)]
    pub top3_accuracy: Option<f64>,
    #[serde(default)]
    pub train_size: Option<usize>,
    #[serde(default)]
    pub test_size: Option<usize>,
    #[serde(default)]
    pub train_date_range: Option<String>,
    #[serde(default)]
    pub test_date_range: Option<String>,
    #[serde(default)]
    pub training_date: Option<String>,
}

/// Both classifiers plus their shared metadata.
#[derive(Debug)]
pub struct ModelBundle {
    top10: Session,
    top3: Session,
    pub metadata: ModelMetadata,
}

/// Probabilities for one rider, one per classification target.
#[derive(Debug, Clone, Copy)]
pub struct Probabilities {
    pub top10: f64,
    pub top3: f64,
}

impl ModelBundle {
    /// Load a bundle directory. Any missing artifact is fatal; a bundle
    /// with only one classifier would silently skew every decision.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();

        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(Error::InvalidInput(format!(
                "model metadata not found: {}",
                metadata_path.display()
            )));
        }
        let metadata: ModelMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        if metadata.features.is_empty() {
            return Err(Error::InvalidInput(
                "model metadata lists no feature columns".to_string(),
            ));
        }

        let top10 = Self::load_session(&dir.join(TOP10_MODEL_FILE))?;
        let top3 = Self::load_session(&dir.join(TOP3_MODEL_FILE))?;

        info!(
            features = metadata.features.len(),
            training_date = metadata.training_date.as_deref().unwrap_or("unknown"),
            "loaded model bundle from {:?}",
            dir
        );

        Ok(Self { top10, top3, metadata })
    }

    fn load_session(path: &Path) -> Result<Session> {
        if !path.exists() {
            return Err(Error::InvalidInput(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        info!("Loading model: {:?}", path);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)?;
        Ok(session)
    }

    /// Score one assembled feature vector against both classifiers.
    pub fn predict_proba(&mut self, features: &[f64]) -> Result<Probabilities> {
        let expected = self.metadata.features.len();
        if features.len() != expected {
            return Err(Error::InvalidInput(format!(
                "feature vector has {} values, model expects {}",
                features.len(),
                expected
            )));
        }

        let top10 = run_classifier(&mut self.top10, features)?;
        let top3 = run_classifier(&mut self.top3, features)?;
        Ok(Probabilities { top10, top3 })
    }
}

/// Run one binary classifier on a single row and return P(positive).
///
/// The exported graphs emit labels first and a `[1, 2]` probability
/// tensor second (zipmap disabled at export time); column 1 is the
/// positive class.
fn run_classifier(session: &mut Session, features: &[f64]) -> Result<f64> {
    let n_features = features.len();
    let input_vec: Vec<f32> = features.iter().map(|&x| x as f32).collect();
    let input_tensor = Tensor::from_array(([1usize, n_features], input_vec))?;

    let outputs = session.run(ort::inputs!["input" => input_tensor])?;
    if outputs.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "classifier produced {} output(s), expected labels plus probabilities",
            outputs.len()
        )));
    }

    let (_, probabilities) = outputs[1].try_extract_tensor::<f32>()?;
    positive_class(probabilities)
}

/// P(positive) from the flat probability row of one binary classifier:
/// column 1 of the `[1, 2]` tensor.
fn positive_class(probabilities: &[f32]) -> Result<f64> {
    match probabilities {
        [_, positive, ..] => Ok(*positive as f64),
        _ => Err(Error::InvalidInput(format!(
            "classifier probability row has {} value(s), expected 2",
            probabilities.len()
        ))),
    }
}
