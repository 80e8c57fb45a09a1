//! Artifact deserialization

use crate::predictor::{JsonRegressor, OnnxRegressor, Preprocessor, Regressor};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Recognized feature-order keys in a metadata file, in priority order
pub const FEATURE_META_KEYS: [&str; 4] = ["feature_order", "feature_names", "columns", "feature_cols"];

/// Reads artifacts from storage
pub trait ArtifactLoader: Send + Sync {
    fn load_regressor(&self, path: &Path) -> Result<Arc<dyn Regressor>>;

    fn load_preprocessor(&self, path: &Path) -> Result<Preprocessor>;

    fn load_feature_meta(&self, path: &Path) -> Result<FeatureMeta>;
}

/// Loads artifacts from the local filesystem, choosing the model format by
/// file extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactLoader;

impl ArtifactLoader for FsArtifactLoader {
    fn load_regressor(&self, path: &Path) -> Result<Arc<dyn Regressor>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "onnx" => Ok(Arc::new(OnnxRegressor::from_path(path)?)),
            "json" => Ok(Arc::new(JsonRegressor::from_path(path)?)),
            other => bail!("Unsupported model file extension '{}' for {:?}", other, path),
        }
    }

    fn load_preprocessor(&self, path: &Path) -> Result<Preprocessor> {
        Preprocessor::from_path(path)
    }

    fn load_feature_meta(&self, path: &Path) -> Result<FeatureMeta> {
        FeatureMeta::from_path(path)
    }
}

/// Feature metadata file contents
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FeatureMeta(Map<String, Value>);

impl FeatureMeta {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature metadata {:?}", path))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Feature metadata must be a JSON object")
    }

    /// The first recognized key holding a non-empty list of strings
    pub fn feature_order(&self) -> Option<Vec<String>> {
        FEATURE_META_KEYS.iter().find_map(|key| {
            let values = self.0.get(*key)?.as_array()?;
            let names: Option<Vec<String>> = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            names.filter(|n| !n.is_empty())
        })
    }
}
