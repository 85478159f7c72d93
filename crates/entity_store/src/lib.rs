//! Keyed entity store for the service resource.
//!
//! Concurrency-safe storage with O(1) lookup by id and by name.

pub mod in_memory;

use async_trait::async_trait;
use common::{RequestContext, Service};
use thiserror::Error;

pub use in_memory::InMemoryServiceStore;

/// Low-level store failures. The application layer qualifies these with the
/// resource kind and requested id before they reach a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("service not found")]
    NotFound,

    #[error("service already exists: {0}")]
    AlreadyExists(String),
}

/// Storage contract for service entities.
///
/// Every method takes a request context; in-memory implementations complete
/// immediately and ignore it. Returned entities are copies.
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> Result<Service, StoreError>;

    /// Snapshot of all entities. Order is unspecified.
    async fn find_all(&self, ctx: &RequestContext) -> Result<Vec<Service>, StoreError>;

    async fn find_by_name(&self, ctx: &RequestContext, name: &str)
        -> Result<Service, StoreError>;

    /// Insert a new entity; fails if the id is taken.
    async fn save(&self, ctx: &RequestContext, service: Service) -> Result<(), StoreError>;

    /// Replace the stored entity with the same id.
    async fn update(&self, ctx: &RequestContext, service: Service) -> Result<(), StoreError>;

    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError>;
}
