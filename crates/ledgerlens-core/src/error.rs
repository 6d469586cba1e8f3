//! Error types for LedgerLens.

use thiserror::Error;

/// Result type alias using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while building graphs or running detectors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rule context not found in the registry.
    #[error("Rule context not found: {0}")]
    ContextNotFound(String),

    /// Rule context already registered.
    #[error("Rule context already registered: {0}")]
    ContextAlreadyRegistered(String),

    /// Kernel already registered.
    #[error("Kernel already registered: {0}")]
    KernelAlreadyRegistered(String),

    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    ValidationError(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Learned model produced a non-finite value.
    #[error("Numerical instability at epoch {epoch}: {detail}")]
    NumericalInstability {
        /// Training epoch at which the value was observed.
        epoch: usize,
        /// What went non-finite.
        detail: String,
    },

    /// Node features could not be assembled for a slice.
    #[error("Feature construction failed: {0}")]
    FeatureConstruction(String),

    /// Run was cancelled by the caller.
    #[error("Analysis cancelled")]
    Cancelled,

    /// Timeout waiting for the analysis to finish.
    #[error("Timeout waiting for analysis after {0:?}")]
    Timeout(std::time::Duration),

    /// Internal error.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl EngineError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::ValidationError(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::InternalError(msg.into())
    }

    /// Create a context not found error.
    #[must_use]
    pub fn context_not_found(id: impl Into<String>) -> Self {
        EngineError::ContextNotFound(id.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::ConfigError(msg.into())
    }

    /// Create a numerical instability error.
    #[must_use]
    pub fn unstable(epoch: usize, detail: impl Into<String>) -> Self {
        EngineError::NumericalInstability {
            epoch,
            detail: detail.into(),
        }
    }

    /// Returns true if this is a recoverable error.
    ///
    /// Learned-model failures are scoped to one slice and never abort a run.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NumericalInstability { .. }
                | EngineError::FeatureConstruction(_)
                | EngineError::Timeout(_)
                | EngineError::ValidationError(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::context_not_found("atlantis");
        assert_eq!(err.to_string(), "Rule context not found: atlantis");

        let err = EngineError::unstable(12, "loss is NaN");
        assert_eq!(
            err.to_string(),
            "Numerical instability at epoch 12: loss is NaN"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(EngineError::unstable(0, "nan").is_recoverable());
        assert!(EngineError::FeatureConstruction("empty".into()).is_recoverable());
        assert!(!EngineError::context_not_found("x").is_recoverable());
        assert!(!EngineError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: EngineError = parse.unwrap_err().into();
        assert!(matches!(err, EngineError::SerializationError(_)));
    }
}
