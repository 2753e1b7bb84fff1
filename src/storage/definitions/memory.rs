use super::DefinitionBackend;
use crate::domain::definition::{EndpointDefinition, EndpointStatus};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local backend used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryBackend {
    /// Insertion order is the listing order.
    rows: RwLock<Vec<EndpointDefinition>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionBackend for MemoryBackend {
    async fn insert(&self, definition: &EndpointDefinition) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|d| d.id == definition.id) {
            anyhow::bail!("definition {} already exists", definition.id);
        }
        rows.push(definition.clone());
        Ok(())
    }

    async fn update(&self, definition: &EndpointDefinition) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|d| d.id == definition.id) {
            Some(row) => {
                *row = definition.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<EndpointDefinition>> {
        Ok(self.rows.read().await.iter().find(|d| d.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<EndpointDefinition>> {
        Ok(self.rows.read().await.clone())
    }

    async fn list_active(&self) -> Result<Vec<EndpointDefinition>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|d| d.status == EndpointStatus::Active)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|d| d.id != id);
        Ok(rows.len() != before)
    }

    async fn mark_unsafe(&self, id: Uuid, message: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|d| d.id == id) {
            Some(row) => {
                row.is_safe = false;
                row.validation_errors = Some(message.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
