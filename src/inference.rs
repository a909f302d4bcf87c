use crate::model::{Classifier, ModelError};
use ndarray::ArrayView4;

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Model returned an empty prediction vector")]
    EmptyOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probabilities: Vec<f32>,
    pub class_index: usize,
    pub confidence: f32,
}

/// Runs one forward pass and picks the most probable class.
pub fn infer(model: &dyn Classifier, tensor: ArrayView4<'_, f32>) -> Result<Prediction, InferenceError> {
    let probabilities = model.forward(tensor)?;
    let (class_index, confidence) = argmax(&probabilities).ok_or(InferenceError::EmptyOutput)?;
    Ok(Prediction {
        probabilities,
        class_index,
        confidence,
    })
}

/// First index holding the maximum value.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best
}
