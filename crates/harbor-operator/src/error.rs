//! Error types for the Harbor Kubernetes Operator

use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error outside of the store capability (controller bootstrap)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Key generation, randomness or certificate signing failed
    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    /// The Harbor instance itself could not be fetched
    #[error("Harbor {namespace}/{name} unavailable: {source}")]
    InstanceUnavailable {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    /// The persisted derived configuration could not be fetched
    #[error("Derived configuration {name} unavailable: {source}")]
    ConfigUnavailable {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The persisted derived configuration could not be decoded
    #[error("Derived configuration {name} is corrupt: {reason}")]
    ConfigCorrupt { name: String, reason: String },

    /// Lookup or create of a dependent object failed
    #[error("Failed to ensure {kind} {namespace}/{name}: {source}")]
    EnsureFailed {
        kind: String,
        name: String,
        namespace: String,
        #[source]
        source: StoreError,
    },

    /// Resource not found
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            OperatorError::KubeError(_)
            | OperatorError::ConfigUnavailable { .. }
            | OperatorError::CryptoFailure(_) => true,
            OperatorError::EnsureFailed { source, .. }
            | OperatorError::InstanceUnavailable { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Get a suggested requeue delay for retryable errors
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        if self.is_retryable() {
            Some(std::time::Duration::from_secs(30))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OperatorError::EnsureFailed {
            kind: "Secret".to_string(),
            name: "demo-database".to_string(),
            namespace: "default".to_string(),
            source: StoreError::Denied("secrets is forbidden".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("Secret"));
        assert!(message.contains("default/demo-database"));
        assert!(message.contains("forbidden"));
    }

    #[test]
    fn test_retryable_errors() {
        let crypto = OperatorError::CryptoFailure("rng".to_string());
        assert!(crypto.is_retryable());

        let corrupt = OperatorError::ConfigCorrupt {
            name: "demo-harbor-int".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(!corrupt.is_retryable());

        let denied = OperatorError::EnsureFailed {
            kind: "Secret".to_string(),
            name: "demo-core".to_string(),
            namespace: "default".to_string(),
            source: StoreError::Denied("forbidden".to_string()),
        };
        assert!(!denied.is_retryable());
    }

    #[test]
    fn test_requeue_delay() {
        let retryable = OperatorError::CryptoFailure("test".to_string());
        assert!(retryable.requeue_delay().is_some());

        let not_retryable = OperatorError::InvalidConfig("test".to_string());
        assert!(not_retryable.requeue_delay().is_none());
    }
}
