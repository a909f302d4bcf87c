use crate::model::{Classifier, FixedClassifier, ModelError, ModelKind, OnnxClassifier};
use crate::model_config::ModelsConfig;
use crate::preprocess::PreprocessSpec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Failed to load {kind} model: {source}")]
    Load {
        kind: ModelKind,
        #[source]
        source: ModelError,
    },
    #[error("No model registered for '{0}'")]
    UnknownModel(ModelKind),
}

/// Loaded models keyed by kind. Built once before serving, never mutated.
pub struct ModelRegistry {
    models: HashMap<ModelKind, Arc<dyn Classifier>>,
}

impl ModelRegistry {
    /// Loads every model or none: the first failing artifact aborts startup.
    pub fn load(config: &ModelsConfig) -> Result<Self, RegistryError> {
        Self::load_with(|kind| {
            let model = OnnxClassifier::load(&config.model_path(kind), config.entry(kind))?;
            Ok(Arc::new(model) as Arc<dyn Classifier>)
        })
    }

    /// Builds every kind through `loader`, stopping at the first failure.
    pub fn load_with<F>(mut loader: F) -> Result<Self, RegistryError>
    where
        F: FnMut(ModelKind) -> Result<Arc<dyn Classifier>, ModelError>,
    {
        let mut models: HashMap<ModelKind, Arc<dyn Classifier>> = HashMap::new();
        for kind in ModelKind::ALL {
            let model = loader(kind).map_err(|source| RegistryError::Load { kind, source })?;
            models.insert(kind, model);
        }
        info!("Models loaded successfully");

        let registry = Self { models };
        registry.log_input_shapes();
        Ok(registry)
    }

    pub fn from_classifiers(
        models: impl IntoIterator<Item = (ModelKind, Arc<dyn Classifier>)>,
    ) -> Self {
        Self {
            models: models.into_iter().collect(),
        }
    }

    /// Fixed-output models for running the service without artifacts.
    pub fn placeholder() -> Self {
        Self::from_classifiers(ModelKind::ALL.map(|kind| {
            let classes = kind.class_names().len();
            let mut probabilities = vec![0.05; classes];
            probabilities[0] = 1.0 - 0.05 * (classes - 1) as f32;

            let spec = PreprocessSpec::for_kind(kind);
            let shape = vec![-1, spec.height as i64, spec.width as i64, 3];
            let model: Arc<dyn Classifier> = Arc::new(FixedClassifier::new(probabilities, shape));
            (kind, model)
        }))
    }

    pub fn get(&self, kind: ModelKind) -> Result<Arc<dyn Classifier>, RegistryError> {
        self.models
            .get(&kind)
            .cloned()
            .ok_or(RegistryError::UnknownModel(kind))
    }

    /// Registered kinds in their fixed order.
    pub fn loaded(&self) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| self.models.contains_key(kind))
            .collect()
    }

    pub fn log_input_shapes(&self) {
        for kind in self.loaded() {
            let Ok(model) = self.get(kind) else { continue };
            let shape = model.input_shape();
            info!("{kind} model input shape: {shape:?}");

            let spec = PreprocessSpec::for_kind(kind);
            if let [_, height, width, _] = shape[..] {
                if height > 0 && width > 0
                    && (height != spec.height as i64 || width != spec.width as i64)
                {
                    warn!(
                        "{kind} model declares {height}x{width} input but images are resized to {}x{}",
                        spec.height, spec.width
                    );
                } else {
                    info!("NOTE: {kind} requires {}x{} images", spec.width, spec.height);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn load_is_all_or_nothing() {
        let config = ModelsConfig::with_models_dir(PathBuf::from("/nonexistent/models"));
        match ModelRegistry::load(&config) {
            Err(RegistryError::Load { kind, source }) => {
                assert_eq!(kind, ModelKind::Soil);
                assert!(matches!(source, ModelError::InvalidPath(_)));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("registry loaded without artifacts"),
        }
    }

    #[test]
    fn later_failure_aborts_after_earlier_successes() {
        let mut attempted = Vec::new();
        let result = ModelRegistry::load_with(|kind| {
            attempted.push(kind);
            match kind {
                ModelKind::Plant => Err(ModelError::InvalidPath("plant_disease_model.onnx".into())),
                _ => Ok(Arc::new(FixedClassifier::new(vec![1.0], vec![])) as Arc<dyn Classifier>),
            }
        });

        assert!(matches!(
            result,
            Err(RegistryError::Load { kind: ModelKind::Plant, .. })
        ));
        assert_eq!(attempted, vec![ModelKind::Soil, ModelKind::Plant]);
    }

    #[test]
    fn get_is_a_pure_lookup() {
        let model: Arc<dyn Classifier> = Arc::new(FixedClassifier::new(vec![1.0], vec![]));
        let registry = ModelRegistry::from_classifiers([(ModelKind::Pest, model)]);

        assert!(registry.get(ModelKind::Pest).is_ok());
        assert!(matches!(
            registry.get(ModelKind::Soil),
            Err(RegistryError::UnknownModel(ModelKind::Soil))
        ));
        assert_eq!(registry.loaded(), vec![ModelKind::Pest]);
    }

    #[test]
    fn placeholder_serves_every_kind() {
        let registry = ModelRegistry::placeholder();
        assert_eq!(registry.loaded(), ModelKind::ALL.to_vec());

        let plant = registry.get(ModelKind::Plant).unwrap();
        assert_eq!(plant.input_shape(), vec![-1, 224, 224, 3]);
    }
}
