//! Shared types, config, request context and error definitions for the rpc-service.

pub mod config;
pub mod context;
pub mod error;
pub mod types;

pub use config::ServerConfig;
pub use context::RequestContext;
pub use error::{Error, ErrorBody};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
