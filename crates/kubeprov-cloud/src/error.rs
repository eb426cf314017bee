//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Account validation failed: {0}")]
    Validation(String),

    #[error("Step \"{step}\" failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error("Cluster {0} already has an operation in flight")]
    ClusterBusy(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error means the target resource does not exist.
    ///
    /// Covers both the explicit `NotFound` variant and raw HTTP 404 responses
    /// that a backend passed through as `Api`.
    pub fn is_not_found(&self) -> bool {
        match self {
            CloudError::NotFound(_) => true,
            CloudError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Description of the failed step, if this error came out of a procedure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            CloudError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Downgrade a not-found error to `Ok(None)`.
///
/// Only teardown paths use this: a resource that is already gone counts as
/// deleted. Every other error is returned unchanged.
pub fn tolerate_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "Resource already absent");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
