//! Turns a raw prediction into the per-model response body.

use crate::inference::Prediction;
use crate::model::ModelKind;
use serde::Serialize;

const PLANT_TREATMENTS: [&str; 3] = [
    "No treatment needed",
    "Apply copper-based fungicide every 7 days",
    "Use sulfur spray weekly",
];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ShapeError {
    #[error("{kind} model predicted class {index}, but only {len} classes are known")]
    ClassOutOfRange {
        kind: ModelKind,
        index: usize,
        len: usize,
    },
    #[error("{kind} model returned {len} scores, expected at least {expected}")]
    ShortVector {
        kind: ModelKind,
        len: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub status: &'static str,
    pub model: &'static str,
    pub prediction: &'static str,
    pub confidence: f32,
    #[serde(flatten)]
    pub details: Details,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Details {
    Soil { composition: Composition },
    Plant { treatment: &'static str },
    Pest { risk_level: RiskLevel },
}

/// Percentages of the clay, sand and silt classes. Loam is not reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Composition {
    pub clay: f64,
    pub sand: f64,
    pub silt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    /// Bands are exclusive at the lower edge: exactly 0.8 is Medium.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.8 {
            RiskLevel::High
        } else if confidence > 0.5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

pub fn shape(kind: ModelKind, prediction: &Prediction) -> Result<PredictionResult, ShapeError> {
    let class_names = kind.class_names();
    let index = prediction.class_index;
    let class_name = class_names.get(index).copied().ok_or(ShapeError::ClassOutOfRange {
        kind,
        index,
        len: class_names.len(),
    })?;

    let details = match kind {
        ModelKind::Soil => Details::Soil {
            composition: composition(&prediction.probabilities)?,
        },
        ModelKind::Plant => Details::Plant {
            treatment: PLANT_TREATMENTS
                .get(index)
                .copied()
                .ok_or(ShapeError::ClassOutOfRange {
                    kind,
                    index,
                    len: PLANT_TREATMENTS.len(),
                })?,
        },
        ModelKind::Pest => Details::Pest {
            risk_level: RiskLevel::from_confidence(prediction.confidence),
        },
    };

    Ok(PredictionResult {
        status: "success",
        model: kind.as_str(),
        prediction: class_name,
        confidence: prediction.confidence,
        details,
    })
}

fn composition(probabilities: &[f32]) -> Result<Composition, ShapeError> {
    if probabilities.len() < 4 {
        return Err(ShapeError::ShortVector {
            kind: ModelKind::Soil,
            len: probabilities.len(),
            expected: 4,
        });
    }
    Ok(Composition {
        clay: percent(probabilities[0]),
        sand: percent(probabilities[2]),
        silt: percent(probabilities[3]),
    })
}

/// Percentage rounded to one decimal place.
fn percent(probability: f32) -> f64 {
    (f64::from(probability) * 1000.0).round() / 10.0
}
