//! Model artifact loading, feature-order resolution and caching

mod cache;
mod loader;
mod resolver;

pub use cache::{fingerprint, signature, ArtifactCache};
pub use loader::{ArtifactLoader, FeatureMeta, FsArtifactLoader, FEATURE_META_KEYS};
pub use resolver::{FeatureOrderResolver, FeatureOrderSource, ResolvedOrder};

use crate::predictor::{Preprocessor, Regressor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configured artifact locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub days_model: Option<PathBuf>,
    pub yield_model: Option<PathBuf>,
    #[serde(default)]
    pub preprocessor: Option<PathBuf>,
    #[serde(default)]
    pub feature_meta: Option<PathBuf>,
    /// Keys that must appear in the resolved feature order
    #[serde(default)]
    pub required_features: Vec<String>,
}

/// The set of models currently being served
///
/// Immutable once built; a reload replaces the whole bundle.
pub struct ModelArtifactBundle {
    pub days_model: Arc<dyn Regressor>,
    pub yield_model: Arc<dyn Regressor>,
    pub preprocessor: Option<Preprocessor>,
    /// Why a configured preprocessor is absent, if it is
    pub preprocessor_error: Option<String>,
    pub feature_order: Option<Vec<String>>,
    pub feature_order_source: Option<FeatureOrderSource>,
    pub days_model_path: PathBuf,
    pub yield_model_path: PathBuf,
    pub signature: String,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

impl ModelArtifactBundle {
    pub fn feature_order(&self) -> Option<&[String]> {
        self.feature_order.as_deref()
    }

    pub fn feature_order_size(&self) -> Option<usize> {
        self.feature_order.as_ref().map(Vec::len)
    }

    /// True when a preprocessor was configured but could not be used
    pub fn is_degraded(&self) -> bool {
        self.preprocessor_error.is_some()
    }
}

impl fmt::Debug for ModelArtifactBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifactBundle")
            .field("days_model", &self.days_model.kind())
            .field("yield_model", &self.yield_model.kind())
            .field("preprocessor", &self.preprocessor.is_some())
            .field("feature_order", &self.feature_order)
            .field("feature_order_source", &self.feature_order_source)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
