//! Harvest forecast engine
//!
//! This crate provides the core functionality for:
//! - Loading and hot-reloading model artifacts
//! - Deriving agronomic features from cycle history or request payloads
//! - Building aligned feature matrices and running dual-model inference
//! - Health checks and observability

pub mod artifacts;
pub mod derive;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod request_id;
pub mod store;


pub use artifacts::{ArtifactCache, ArtifactPaths, FeatureOrderSource, ModelArtifactBundle};
pub use derive::AgronomicFeatureDeriver;
pub use error::{ForecastError, ForecastResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ForecastMetrics, StructuredLogger};
pub use predictor::{DerivedFeatures, PredictionEngine};
pub use request_id::RequestIdGenerator;
pub use store::{CycleStore, SnapshotCycleStore};
