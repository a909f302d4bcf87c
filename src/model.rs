use crate::model_config::ModelEntry;
use ndarray::ArrayView4;
use ort::error::Error as OrtError;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionOutputs};
use ort::value::ValueType;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] OrtError),
    #[error("Model output format unexpected")]
    OutputFormatUnexpected,
    #[error("Invalid path for model files: {0}")]
    InvalidPath(String),
    #[error("Failed to convert model output")]
    OutputConversion,
    #[error("Model session lock poisoned")]
    Poisoned,
}

/// The three supported model domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    Soil,
    Plant,
    Pest,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Soil, ModelKind::Plant, ModelKind::Pest];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Soil => "soil",
            ModelKind::Plant => "plant",
            ModelKind::Pest => "pest",
        }
    }

    /// Class names, positionally matching the model's output vector.
    pub fn class_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::Soil => &["Clay", "Loam", "Sand", "Silt"],
            ModelKind::Plant => &["Healthy", "Leaf_Rust", "Powdery_Mildew"],
            ModelKind::Pest => &["Aphids", "Whiteflies", "Spider_Mites"],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModelKind(pub String);

impl FromStr for ModelKind {
    type Err = UnknownModelKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownModelKind(s.to_string()))
    }
}

/// Anything that maps a preprocessed NHWC batch to a class probability vector.
pub trait Classifier: Send + Sync {
    fn forward(&self, tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError>;

    /// Declared input shape; `-1` marks a symbolic dimension.
    fn input_shape(&self) -> Vec<i64>;
}

pub struct OnnxClassifier {
    // ONNX Runtime does not promise concurrent `run` on one session for every
    // execution provider, so each model is used by one request at a time.
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_shape: Vec<i64>,
    logits: bool,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, entry: &ModelEntry) -> Result<Self, ModelError> {
        info!("Loading model from: {:?}", model_path);

        if !model_path.exists() {
            return Err(ModelError::InvalidPath(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        let session = SessionBuilder::new()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get())?
            .commit_from_file(model_path)?;

        let input = session.inputs.first().ok_or(ModelError::OutputFormatUnexpected)?;
        let input_name = input.name.clone();
        let input_shape = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            _ => Vec::new(),
        };
        let output_name = session
            .outputs
            .first()
            .ok_or(ModelError::OutputFormatUnexpected)?
            .name
            .clone();
        debug!(%input_name, %output_name, "ONNX Runtime session created");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_shape,
            logits: entry.logits,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn forward(&self, tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
        let session = self.session.lock().map_err(|_| ModelError::Poisoned)?;

        let inputs = ort::inputs![self.input_name.as_str() => tensor.into_dyn()]?;
        let outputs: SessionOutputs = session.run(inputs)?;

        let output_value = outputs
            .get(self.output_name.as_str())
            .ok_or(ModelError::OutputFormatUnexpected)?;

        // Shape is [1, num_classes].
        let view = output_value.try_extract_tensor::<f32>()?;
        let scores = view.as_slice().ok_or(ModelError::OutputConversion)?;

        if self.logits {
            Ok(softmax(scores))
        } else {
            Ok(scores.to_vec())
        }
    }

    fn input_shape(&self) -> Vec<i64> {
        self.input_shape.clone()
    }
}

/// Returns the same probability vector for every input.
pub struct FixedClassifier {
    probabilities: Vec<f32>,
    input_shape: Vec<i64>,
}

impl FixedClassifier {
    pub fn new(probabilities: Vec<f32>, input_shape: Vec<i64>) -> Self {
        Self {
            probabilities,
            input_shape,
        }
    }
}

impl Classifier for FixedClassifier {
    fn forward(&self, _tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
        Ok(self.probabilities.clone())
    }

    fn input_shape(&self) -> Vec<i64> {
        self.input_shape.clone()
    }
}

pub fn softmax(data: &[f32]) -> Vec<f32> {
    let max_val = data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = data.iter().map(|&x| (x - max_val).exp()).collect();
    let sum_exps: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum_exps).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn parses_exact_identifiers_only() {
        assert_eq!("soil".parse::<ModelKind>(), Ok(ModelKind::Soil));
        assert_eq!("pest".parse::<ModelKind>(), Ok(ModelKind::Pest));
        assert_eq!(
            "Soil".parse::<ModelKind>(),
            Err(UnknownModelKind("Soil".to_string()))
        );
        assert!("rock".parse::<ModelKind>().is_err());
    }

    #[test]
    fn class_tables_match_model_heads() {
        assert_eq!(ModelKind::Soil.class_names()[1], "Loam");
        assert_eq!(ModelKind::Plant.class_names().len(), 3);
        assert_eq!(ModelKind::Pest.class_names()[2], "Spider_Mites");
    }

    #[test]
    fn softmax_is_a_distribution() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn fixed_classifier_ignores_input() {
        let model = FixedClassifier::new(vec![0.2, 0.8], vec![-1, 150, 150, 3]);
        let tensor = Array4::<f32>::zeros((1, 150, 150, 3));
        assert_eq!(model.forward(tensor.view()).unwrap(), vec![0.2, 0.8]);
        assert_eq!(model.input_shape(), vec![-1, 150, 150, 3]);
    }

    #[test]
    fn onnx_load_rejects_missing_artifact() {
        let entry = ModelEntry {
            file: "missing.onnx".into(),
            logits: false,
        };
        let result = OnnxClassifier::load(Path::new("/nonexistent/missing.onnx"), &entry);
        assert!(matches!(result, Err(ModelError::InvalidPath(_))));
    }
}
