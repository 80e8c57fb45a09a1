//! Liveness and readiness for the forecast service
//!
//! Two components are tracked: `artifacts` follows the outcome of every
//! bundle fetch and `predictor` follows model execution. The overall status
//! is the worst component status.

use crate::artifacts::ModelArtifactBundle;
use crate::error::ForecastError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, but with reduced fidelity (e.g. no preprocessor)
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    /// Fingerprint of the last bundle that loaded
    pub bundle_fingerprint: Option<String>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const ARTIFACTS: &str = "artifacts";
    pub const PREDICTOR: &str = "predictor";
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    bundle_fingerprint: Option<String>,
    ready: bool,
}

impl HealthState {
    fn status(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared, cloneable view of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record a bundle fetch: healthy on success, degraded when the configured
    /// preprocessor could not be used, unhealthy on failure
    pub async fn observe_bundle(&self, outcome: Result<&ModelArtifactBundle, &ForecastError>) {
        let health = match outcome {
            Ok(bundle) => match &bundle.preprocessor_error {
                Some(reason) => ComponentHealth::degraded(format!("Preprocessor unavailable: {}", reason)),
                None => ComponentHealth::healthy(),
            },
            Err(e) => ComponentHealth::unhealthy(e.to_string()),
        };

        let mut state = self.state.write().await;
        if let Ok(bundle) = outcome {
            state.bundle_fingerprint = Some(bundle.fingerprint.clone());
        }
        state.components.insert(components::ARTIFACTS.to_string(), health);
    }

    /// Record a model run; only inference failures count against the predictor
    pub async fn observe_inference(&self, outcome: Result<(), &ForecastError>) {
        match outcome {
            Ok(()) => self.set_healthy(components::PREDICTOR).await,
            Err(e) if matches!(e, ForecastError::Inference(_)) => {
                self.set_degraded(components::PREDICTOR, e.to_string()).await
            }
            Err(_) => {}
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.status(),
            bundle_fingerprint: state.bundle_fingerprint.clone(),
            components: state.components.clone(),
        }
    }

    /// Ready once startup finished and nothing is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if !state.ready {
            Some("Artifacts not yet loaded".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, c)| c.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| format!("Component {} is unhealthy", name))
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
