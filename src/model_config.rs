// src/model_config.rs
use crate::model::ModelKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid model config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One serialized model artifact.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ModelEntry {
    /// File name relative to the models directory.
    pub file: String,
    /// Set when the exported graph ends in raw logits instead of a softmax.
    #[serde(default)]
    pub logits: bool,
}

impl ModelEntry {
    fn named(file: &str) -> Self {
        Self {
            file: file.to_string(),
            logits: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    #[serde(skip)]
    pub models_dir: PathBuf,
    pub soil: ModelEntry,
    pub plant: ModelEntry,
    pub pest: ModelEntry,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            soil: ModelEntry::named("final_soil_model.onnx"),
            plant: ModelEntry::named("plant_disease_model.onnx"),
            pest: ModelEntry::named("final_pest_model.onnx"),
        }
    }
}

impl ModelsConfig {
    /// Reads the JSON config at `path`. Keys left out keep their defaults.
    pub fn from_file(path: &Path, models_dir: PathBuf) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ModelsConfig =
            serde_json::from_reader(file).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.models_dir = models_dir;
        Ok(config)
    }

    pub fn with_models_dir(models_dir: PathBuf) -> Self {
        Self {
            models_dir,
            ..Self::default()
        }
    }

    pub fn entry(&self, kind: ModelKind) -> &ModelEntry {
        match kind {
            ModelKind::Soil => &self.soil,
            ModelKind::Plant => &self.plant,
            ModelKind::Pest => &self.pest,
        }
    }

    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.models_dir.join(&self.entry(kind).file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_the_three_artifacts() {
        let config = ModelsConfig::with_models_dir(PathBuf::from("/srv/models"));
        assert_eq!(
            config.model_path(ModelKind::Plant),
            PathBuf::from("/srv/models/plant_disease_model.onnx")
        );
        assert!(!config.entry(ModelKind::Soil).logits);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let path = std::env::temp_dir().join(format!("agriml-config-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{ "pest": {{ "file": "pest_v2.onnx", "logits": true }} }}"#).unwrap();
        drop(file);

        let config = ModelsConfig::from_file(&path, PathBuf::from("m")).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.pest, ModelEntry { file: "pest_v2.onnx".into(), logits: true });
        assert_eq!(config.soil.file, "final_soil_model.onnx");
        assert_eq!(config.models_dir, PathBuf::from("m"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ModelsConfig::from_file(Path::new("/nonexistent/agriml.json"), PathBuf::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
