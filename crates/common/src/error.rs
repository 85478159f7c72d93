//! Unified error type for the rpc-service.
//!
//! Every error a transport can see maps onto a stable machine-readable code
//! via [`Error::code`], so adapters never have to inspect variants themselves.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{resource} not found with id: {id}")]
    NotFound { resource: String, id: String },

    #[error("validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("upstream rejected the configured API key")]
    Unauthorized,

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable code rendered on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Error::RateLimited => "RATE_LIMITED",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Config(_) | Error::Json(_) | Error::Io(_) => "INTERNAL",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Caused by the request itself rather than by this service or its upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::Validation { .. } | Error::AlreadyExists(_)
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Wire form of an error: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Same classification as [`Error::is_client_error`], by code.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code.as_str(),
            "NOT_FOUND" | "VALIDATION_ERROR" | "ALREADY_EXISTS"
        )
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        err.to_body()
    }
}
