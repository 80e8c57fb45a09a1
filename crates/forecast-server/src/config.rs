//! Server configuration

use anyhow::{Context, Result};
use forecast_lib::ArtifactPaths;
use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration, read from `FORECAST_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub model_path_days: Option<PathBuf>,

    #[serde(default)]
    pub model_path_yield: Option<PathBuf>,

    #[serde(default)]
    pub preproc_path: Option<PathBuf>,

    #[serde(default)]
    pub feature_meta_path: Option<PathBuf>,

    /// Comma-separated feature keys every request must supply
    #[serde(default)]
    pub required_features: Option<String>,

    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "harvest-forecast".to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path_days: None,
            model_path_yield: None,
            preproc_path: None,
            feature_meta_path: None,
            required_features: None,
            api_host: default_api_host(),
            api_port: default_api_port(),
            instance_name: default_instance_name(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FORECAST"))
            .build()
            .context("Failed to read FORECAST_* environment")?;

        config
            .try_deserialize()
            .context("Invalid FORECAST_* configuration")
    }

    pub fn required_features(&self) -> Vec<String> {
        split_list(self.required_features.as_deref().unwrap_or(""))
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            days_model: non_empty(&self.model_path_days),
            yield_model: non_empty(&self.model_path_yield),
            preprocessor: non_empty(&self.preproc_path),
            feature_meta: non_empty(&self.feature_meta_path),
            required_features: self.required_features(),
        }
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<PathBuf> {
    path.clone().filter(|p| !p.as_os_str().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
