//! Error types shared across netplane crates
//!
//! Errors carry enough context (config path, resource kind, operation) to be
//! read directly by an operator; there is no machine-readable error channel.

use std::path::PathBuf;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for netplane common operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Datastore configuration could not be loaded
    #[error("config error [{}]: {message}", display_path(.path))]
    Config {
        /// Path of the config file, if one was involved
        path: Option<PathBuf>,
        /// Description of what failed
        message: String,
    },

    /// A manifest or config value is structurally valid but semantically wrong
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.cidr")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client")
        context: String,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| UNKNOWN_CONTEXT.to_string())
}

impl Error {
    /// Create a config error not tied to a particular file
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            path: None,
            message: msg.into(),
        }
    }

    /// Create a config error for a specific file
    pub fn config_at(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Config {
            path: Some(path.into()),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}
