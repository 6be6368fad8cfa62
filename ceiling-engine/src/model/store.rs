//! Model artifact persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use ceiling_common::{Error, Result, ResultExt};

use super::ensemble::{EnsembleModel, TrainingReport};
use super::features::FEATURE_NAMES;

/// A trained model together with the feature layout it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub model: EnsembleModel,
    pub report: Option<TrainingReport>,
}

impl ModelArtifact {
    pub fn new(name: impl Into<String>, model: EnsembleModel, report: Option<TrainingReport>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            feature_names: EnsembleModel::feature_names(),
            model,
            report,
        }
    }

    /// Reject artifacts trained on a different feature layout.
    pub fn check_features(&self) -> Result<()> {
        let matches = self.feature_names.len() == FEATURE_NAMES.len()
            && self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES.iter())
                .all(|(a, b)| a == b);
        if matches {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "model '{}' feature layout mismatch: [{}]",
                self.name,
                self.feature_names.join(", ")
            )))
        }
    }
}

/// Named artifact storage.
pub trait ModelStore: Send + Sync {
    /// Load an artifact; `Error::NotFound` when none is stored.
    fn load(&self, name: &str) -> Result<ModelArtifact>;

    fn save(&self, name: &str, artifact: &ModelArtifact) -> Result<()>;
}

fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid model name: {name}")))
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Default)]
pub struct InMemoryModelStore {
    artifacts: RwLock<HashMap<String, ModelArtifact>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, name: &str) -> Result<ModelArtifact> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|e| Error::Internal(format!("model store lock poisoned: {e}")))?;
        let artifact = artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("model {name}")))?;
        artifact.check_features()?;
        Ok(artifact)
    }

    fn save(&self, name: &str, artifact: &ModelArtifact) -> Result<()> {
        check_name(name)?;
        artifact.check_features()?;
        self.artifacts
            .write()
            .map_err(|e| Error::Internal(format!("model store lock poisoned: {e}")))?
            .insert(name.to_string(), artifact.clone());
        Ok(())
    }
}

// ============================================================================
// JSON File Store
// ============================================================================

/// One pretty-printed `<name>.json` file per artifact.
pub struct JsonFileModelStore {
    dir: PathBuf,
}

impl JsonFileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl ModelStore for JsonFileModelStore {
    fn load(&self, name: &str) -> Result<ModelArtifact> {
        check_name(name)?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(Error::NotFound(format!("model file {}", path.display())));
        }

        let content = fs::read_to_string(&path)
            .context(format!("reading model {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&content)
            .context(format!("parsing model {}", path.display()))?;
        artifact.check_features()?;

        debug!(model = name, path = %path.display(), "Model loaded");
        Ok(artifact)
    }

    fn save(&self, name: &str, artifact: &ModelArtifact) -> Result<()> {
        check_name(name)?;
        artifact.check_features()?;
        fs::create_dir_all(&self.dir)
            .context(format!("creating model dir {}", self.dir.display()))?;

        let path = self.path_for(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        let content = serde_json::to_string_pretty(artifact)?;
        fs::write(&tmp, content).context(format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).context(format!("replacing {}", path.display()))?;

        info!(model = name, path = %path.display(), "Model saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ensemble::{TrainingParams, TrainingSet};
    use crate::model::features::{FeatureVector, FEATURE_COUNT};
    use tempfile::TempDir;

    fn artifact() -> ModelArtifact {
        let mut set = TrainingSet::new();
        for i in 0..60 {
            let mut row = [0.0; FEATURE_COUNT];
            row[3] = i as f64;
            set.push(FeatureVector::from_slice(&row).unwrap(), i >= 45);
        }
        let params = TrainingParams {
            n_trees: 5,
            ..Default::default()
        };
        let (model, report) = EnsembleModel::train(&set, &params).unwrap();
        ModelArtifact::new("ceiling_ensemble", model, Some(report))
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = InMemoryModelStore::new();
        assert!(store.load("ceiling_ensemble").unwrap_err().is_not_found());

        let artifact = artifact();
        store.save("ceiling_ensemble", &artifact).unwrap();
        assert_eq!(store.load("ceiling_ensemble").unwrap(), artifact);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileModelStore::new(dir.path().join("models"));
        assert!(store.load("ceiling_ensemble").unwrap_err().is_not_found());

        let artifact = artifact();
        store.save("ceiling_ensemble", &artifact).unwrap();
        assert!(dir.path().join("models/ceiling_ensemble.json").exists());

        let loaded = store.load("ceiling_ensemble").unwrap();
        assert_eq!(loaded.feature_names, artifact.feature_names);
        let row = [1.0; FEATURE_COUNT];
        let a = loaded.model.predict_proba(&row).unwrap();
        let b = artifact.model.predict_proba(&row).unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_feature_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileModelStore::new(dir.path());
        let mut artifact = artifact();
        store.save("m", &artifact).unwrap();

        // Tamper with the stored layout
        artifact.feature_names.swap(0, 1);
        let content = serde_json::to_string(&artifact).unwrap();
        fs::write(dir.path().join("m.json"), content).unwrap();

        let err = store.load("m").unwrap_err();
        assert!(err.to_string().contains("feature layout mismatch"));
    }

    #[test]
    fn test_invalid_names() {
        let store = InMemoryModelStore::new();
        assert!(store.save("../escape", &artifact()).is_err());
        assert!(store.save("", &artifact()).is_err());
    }
}
