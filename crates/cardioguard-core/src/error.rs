//! Error types for CardioGuard

use crate::validation::ValidationErrors;

/// Result type alias using CardioGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for CardioGuard operations
///
/// Each variant maps to a distinct caller-facing class; the server turns
/// them into HTTP statuses without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or physiologically implausible input
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Batch size outside the accepted bounds
    #[error("batch must contain between {min} and {max} instances, got {actual}")]
    BatchSize {
        min: usize,
        max: usize,
        actual: usize,
    },

    /// Missing or invalid credential
    #[error("authentication error: {0}")]
    Auth(String),

    /// Admission window for the credential is full
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// No model snapshot is loaded
    #[error("model is not loaded")]
    ModelUnavailable,

    /// Unexpected failure inside the model call
    #[error("inference error: {0}")]
    Inference(String),

    /// Artifact file does not exist
    #[error("model artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Artifact could not be loaded; any active snapshot is untouched
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Configuration errors, including artifact/schema mismatches
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new artifact error
    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable short name used for metric labels and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::BatchSize { .. } => "batch_size",
            Self::Auth(_) => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelUnavailable => "model_unavailable",
            Self::Inference(_) => "inference",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::Artifact(_) => "artifact",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
