//! Persistence backends for endpoint definitions.

use crate::domain::definition::EndpointDefinition;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

/// Raw CRUD over stored definitions. Validation and caching live above this layer.
#[async_trait]
pub trait DefinitionBackend: Send + Sync {
    async fn insert(&self, definition: &EndpointDefinition) -> Result<()>;

    /// Replaces the stored record. Returns false when `definition.id` does not exist.
    async fn update(&self, definition: &EndpointDefinition) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<EndpointDefinition>>;

    /// All definitions, oldest first.
    async fn list(&self) -> Result<Vec<EndpointDefinition>>;

    /// Definitions with `status = active`, oldest first.
    async fn list_active(&self) -> Result<Vec<EndpointDefinition>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Persists a failed verdict found outside a save (the compile-time re-check).
    async fn mark_unsafe(&self, id: Uuid, message: &str) -> Result<bool>;
}
