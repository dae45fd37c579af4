// Error types for capability registration and dispatch

use crate::types::{CapabilityKind, ErrorKind};

/// Failure while resolving, validating or running a capability
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    /// No capability is registered under the requested name or URI
    #[error("Unknown {kind}: {key}")]
    NotFound { kind: CapabilityKind, key: String },

    /// Arguments do not fit the declared parameter schema
    #[error("Invalid argument '{parameter}': {reason}")]
    Validation { parameter: String, reason: String },

    /// Expression rejected by the sandboxed evaluator's grammar
    #[error("{0}")]
    SandboxRejected(String),

    /// Any other fault raised inside a handler
    #[error("{0}")]
    HandlerFailure(String),
}

impl CapabilityError {
    pub fn not_found(kind: CapabilityKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn validation(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn handler(reason: impl Into<String>) -> Self {
        Self::HandlerFailure(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::SandboxRejected(_) => ErrorKind::SandboxRejected,
            Self::HandlerFailure(_) => ErrorKind::HandlerFailure,
        }
    }
}

/// Failure while registering a capability
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The key is already taken by a capability of another kind
    #[error("'{key}' is already registered as a {existing}, cannot register it as a {requested}")]
    DuplicateKindMismatch {
        key: String,
        existing: CapabilityKind,
        requested: CapabilityKind,
    },

    /// The template could match the same URI as an already registered one
    #[error("URI template '{template}' overlaps with registered template '{existing}'")]
    AmbiguousTemplate { template: String, existing: String },

    #[error("Invalid URI template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}
