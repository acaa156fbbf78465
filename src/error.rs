//! Request resolution errors
//!
//! Every error aborts the resolution of the request it belongs to. Errors fall
//! into two categories that map to distinct client responses:
//! - malformed request (bad grammar, unknown option, bad argument, unknown preset) → 400
//! - access denied (signature mismatch) → 403

use thiserror::Error;

/// Category of a [`ProcessingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedRequest,
    AccessDenied,
}

/// Errors produced while turning a request into processing options
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessingError {
    /// Path does not follow the URL grammar
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Source URL could not be decoded or is empty
    #[error("Invalid source URL: {0}")]
    InvalidSourceUrl(String),

    /// Option name is not part of the grammar
    #[error("Unknown processing option: {0}")]
    UnknownOption(String),

    /// Option arguments have the wrong arity, type or range
    #[error("Invalid {option} arguments: {message}")]
    InvalidArgument { option: String, message: String },

    /// Preset is not defined in the configuration
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// Signature does not match any configured key/salt pair.
    /// Carries no detail about the mismatch.
    #[error("Invalid signature")]
    InvalidSignature,
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::InvalidSignature => ErrorKind::AccessDenied,
            _ => ErrorKind::MalformedRequest,
        }
    }

    /// Maps errors to HTTP status codes
    ///
    /// - InvalidSignature → 403 (Forbidden)
    /// - everything else → 400 (Bad Request)
    pub fn to_http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::AccessDenied => 403,
            ErrorKind::MalformedRequest => 400,
        }
    }

    pub fn invalid_path(message: impl Into<String>) -> Self {
        ProcessingError::InvalidPath(message.into())
    }

    pub fn invalid_source(message: impl Into<String>) -> Self {
        ProcessingError::InvalidSourceUrl(message.into())
    }

    pub fn invalid_arg(option: impl Into<String>, message: impl Into<String>) -> Self {
        ProcessingError::InvalidArgument {
            option: option.into(),
            message: message.into(),
        }
    }
}
