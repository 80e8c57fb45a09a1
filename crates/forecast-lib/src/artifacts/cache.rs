//! Signature-keyed artifact cache
//!
//! The cache holds at most one bundle. Every access recomputes the signature
//! from path modification times; a changed signature triggers exactly one
//! reload no matter how many callers notice it at once.

use super::{
    ArtifactLoader, ArtifactPaths, FeatureMeta, FeatureOrderResolver, FsArtifactLoader,
    ModelArtifactBundle,
};
use crate::error::{ForecastError, ForecastResult};
use crate::observability::ForecastMetrics;
use crate::predictor::Preprocessor;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Length of the hex fingerprint used in logs and metric labels
const FINGERPRINT_LEN: usize = 12;

/// Artifact signature: one `TAG:path:mtime` segment per configured path
pub fn signature(paths: &ArtifactPaths) -> String {
    [
        ("DAYS", paths.days_model.as_deref()),
        ("YIELD", paths.yield_model.as_deref()),
        ("PREP", paths.preprocessor.as_deref()),
        ("META", paths.feature_meta.as_deref()),
    ]
    .iter()
    .map(|(tag, path)| match path {
        Some(path) => format!("{}:{}:{}", tag, path.display(), mtime_component(path)),
        None => format!("{}:-:-", tag),
    })
    .collect::<Vec<_>>()
    .join("|")
}

fn mtime_component(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
        .unwrap_or_else(|| "NA".to_string())
}

/// Short SHA-256 hex digest of a signature
pub fn fingerprint(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Lazily loaded, hot-reloading model bundle
pub struct ArtifactCache {
    paths: ArtifactPaths,
    loader: Box<dyn ArtifactLoader>,
    slot: RwLock<Option<Arc<ModelArtifactBundle>>>,
    load_lock: Mutex<()>,
    loads: AtomicU64,
    metrics: ForecastMetrics,
}

impl ArtifactCache {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self::with_loader(paths, FsArtifactLoader)
    }

    pub fn with_loader(paths: ArtifactPaths, loader: impl ArtifactLoader + 'static) -> Self {
        Self {
            paths,
            loader: Box::new(loader),
            slot: RwLock::new(None),
            load_lock: Mutex::new(()),
            loads: AtomicU64::new(0),
            metrics: ForecastMetrics::new(),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// The cached bundle, without checking for changes
    pub fn current(&self) -> Option<Arc<ModelArtifactBundle>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of successful loads so far
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Return the bundle for the current artifact signature, loading it if
    /// the signature changed since the last load
    pub fn get_bundle(&self) -> ForecastResult<Arc<ModelArtifactBundle>> {
        let (days_path, yield_path) = self.model_paths()?;

        let sig = signature(&self.paths);
        if let Some(bundle) = self.cached(&sig) {
            return Ok(bundle);
        }

        let _guard = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());

        // Another caller may have finished this load while we waited
        let sig = signature(&self.paths);
        if let Some(bundle) = self.cached(&sig) {
            debug!(signature = %sig, "Bundle loaded by concurrent caller");
            return Ok(bundle);
        }

        let previous = self.current().map(|b| b.fingerprint.clone());
        let start = Instant::now();
        match self.load(sig, days_path, yield_path) {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(bundle.clone());
                self.loads.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_artifact_load(start.elapsed().as_secs_f64());
                self.metrics.set_bundle(
                    &bundle.fingerprint,
                    bundle.feature_order_source.map_or("none", |s| s.as_str()),
                    bundle.feature_order_size().unwrap_or(0),
                );
                info!(
                    event = "bundle_loaded",
                    bundle_fingerprint = %bundle.fingerprint,
                    previous_fingerprint = ?previous,
                    feature_order_source = ?bundle.feature_order_source,
                    feature_count = ?bundle.feature_order_size(),
                    preprocessor = bundle.preprocessor.is_some(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model artifact bundle loaded"
                );
                Ok(bundle)
            }
            Err(e) => {
                self.metrics.inc_artifact_load_failures();
                error!(
                    event = "bundle_load_failed",
                    error = %e,
                    previous_fingerprint = ?previous,
                    "Model artifact bundle failed to load"
                );
                Err(e)
            }
        }
    }

    fn model_paths(&self) -> ForecastResult<(PathBuf, PathBuf)> {
        match (&self.paths.days_model, &self.paths.yield_model) {
            (Some(days), Some(yield_path)) => Ok((days.clone(), yield_path.clone())),
            (None, _) => Err(ForecastError::config("Days model path is not configured")),
            (_, None) => Err(ForecastError::config("Yield model path is not configured")),
        }
    }

    fn cached(&self, sig: &str) -> Option<Arc<ModelArtifactBundle>> {
        self.current().filter(|b| b.signature == sig)
    }

    fn load(
        &self,
        signature: String,
        days_path: PathBuf,
        yield_path: PathBuf,
    ) -> ForecastResult<ModelArtifactBundle> {
        let days_model = self.loader.load_regressor(&days_path).map_err(|e| {
            ForecastError::load("days model", days_path.display().to_string(), format!("{:#}", e))
        })?;
        debug!(path = ?days_path, kind = days_model.kind(), "Loaded days model");

        let yield_model = self.loader.load_regressor(&yield_path).map_err(|e| {
            ForecastError::load("yield model", yield_path.display().to_string(), format!("{:#}", e))
        })?;
        debug!(path = ?yield_path, kind = yield_model.kind(), "Loaded yield model");

        let (preprocessor, preprocessor_error) = self.load_preprocessor();
        let meta = self.load_feature_meta();

        let resolved = FeatureOrderResolver::resolve(
            meta.as_ref(),
            preprocessor.as_ref(),
            Some(days_model.as_ref()),
            Some(yield_model.as_ref()),
        );
        if resolved.is_none() {
            warn!("No feature order could be resolved; named inputs will be rejected");
        }
        let (feature_order, feature_order_source) = match resolved {
            Some(r) => (Some(r.names), Some(r.source)),
            None => (None, None),
        };

        check_required(feature_order.as_deref(), &self.paths.required_features)?;

        Ok(ModelArtifactBundle {
            days_model,
            yield_model,
            preprocessor,
            preprocessor_error,
            feature_order,
            feature_order_source,
            days_model_path: days_path,
            yield_model_path: yield_path,
            fingerprint: fingerprint(&signature),
            signature,
            loaded_at: chrono::Utc::now(),
        })
    }

    fn load_preprocessor(&self) -> (Option<Preprocessor>, Option<String>) {
        let Some(path) = &self.paths.preprocessor else {
            return (None, None);
        };
        if !path.is_file() {
            warn!(path = ?path, "Configured preprocessor does not exist, continuing without it");
            return (None, Some(format!("Preprocessor not found at {}", path.display())));
        }
        match self.loader.load_preprocessor(path) {
            Ok(preprocessor) => (Some(preprocessor), None),
            Err(e) => {
                warn!(path = ?path, error = %format!("{:#}", e), "Failed to load preprocessor, continuing without it");
                (None, Some(format!("{:#}", e)))
            }
        }
    }

    fn load_feature_meta(&self) -> Option<FeatureMeta> {
        let path = self.paths.feature_meta.as_ref().filter(|p| p.is_file())?;
        match self.loader.load_feature_meta(path) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = ?path, error = %format!("{:#}", e), "Failed to load feature metadata, ignoring it");
                None
            }
        }
    }
}

fn check_required(order: Option<&[String]>, required: &[String]) -> ForecastResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    let Some(order) = order else {
        return Err(ForecastError::config(
            "Required features are configured but no feature order could be resolved",
        ));
    };
    let missing: Vec<&str> = required
        .iter()
        .filter(|key| !order.contains(*key))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ForecastError::config(format!(
            "Feature order is missing required features: {}",
            missing.join(", ")
        )))
    }
}
