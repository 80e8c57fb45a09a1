//! Error taxonomy for the forecast engine
//!
//! Every failure surfaced to a caller is one of these kinds. Validation and
//! not-found failures are the caller's fault; everything else is a
//! server-side failure.

use thiserror::Error;

/// Errors produced by artifact loading, feature building and prediction
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Required configuration is missing or inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// An artifact file is missing or cannot be deserialized
    #[error("failed to load {artifact} from {path}: {reason}")]
    Load {
        artifact: &'static str,
        path: String,
        reason: String,
    },

    /// Request input is malformed
    #[error("{0}")]
    Validation(String),

    /// A referenced historical cycle does not exist
    #[error("cycle {0} not found")]
    NotFound(i64),

    /// A model or the preprocessor failed while predicting
    #[error("inference failed: {0}")]
    Inference(String),

    /// The historical-data collaborator failed
    #[error("cycle store error: {0}")]
    Store(String),
}

/// Envelope code for server-side failures
pub const CODE_SERVER: u16 = 100;
/// Envelope code for input validation failures
pub const CODE_VALIDATION: u16 = 200;
/// Envelope code for missing cycles
pub const CODE_NOT_FOUND: u16 = 404;

impl ForecastError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn load(artifact: &'static str, path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            artifact,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true when the caller sent something the engine cannot use
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }

    /// Numeric code placed in the error envelope
    pub fn code(&self) -> u16 {
        match self {
            Self::Validation(_) => CODE_VALIDATION,
            Self::NotFound(_) => CODE_NOT_FOUND,
            _ => CODE_SERVER,
        }
    }

    /// HTTP status for the envelope
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Load { .. } => "load",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Inference(_) => "inference",
            Self::Store(_) => "store",
        }
    }
}

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;
