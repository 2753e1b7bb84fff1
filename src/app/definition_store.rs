//! The definition store.
//!
//! This module sits between the admin API and a [`DefinitionBackend`]. It is responsible for:
//! 1.  Normalising authoring input and deriving `is_safe`/`validation_errors` on every save.
//! 2.  Serving the active definition list through a read-through [`DefinitionCache`].
//! 3.  Invalidating that cache synchronously on every mutation.

use crate::domain::definition::{CallbackType, DefinitionInput, EndpointDefinition};
use crate::domain::functions::FunctionRegistry;
use crate::domain::validator::{CodeValidator, ValidationVerdict};
use crate::storage::cache::DefinitionCache;
use crate::storage::definitions::DefinitionBackend;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Active definitions as read at one cache generation.
#[derive(Clone)]
pub struct EligibleSnapshot {
    pub definitions: Arc<Vec<EndpointDefinition>>,
    pub generation: u64,
}

pub struct DefinitionStore {
    backend: Arc<dyn DefinitionBackend>,
    cache: DefinitionCache,
    validator: CodeValidator,
    functions: Arc<FunctionRegistry>,
}

impl DefinitionStore {
    pub fn new(backend: Arc<dyn DefinitionBackend>, cache: DefinitionCache, functions: Arc<FunctionRegistry>) -> Self {
        Self {
            backend,
            cache,
            validator: CodeValidator::new(),
            functions,
        }
    }

    pub fn cache(&self) -> &DefinitionCache {
        &self.cache
    }

    pub async fn generation(&self) -> u64 {
        self.cache.generation().await
    }

    /// Verdict for a callback without saving anything.
    pub fn validate_only(&self, callback_type: CallbackType, callback_ref: &str) -> ValidationVerdict {
        match callback_type {
            CallbackType::NamedFunction => self
                .validator
                .validate_reference(callback_ref, |name| self.functions.contains(name)),
            CallbackType::InlineCode => self.validator.validate(callback_ref),
        }
    }

    pub async fn create(&self, input: DefinitionInput) -> Result<EndpointDefinition> {
        let mut definition = EndpointDefinition::from_input(Uuid::new_v4(), input);
        let verdict = self.validate_only(definition.callback_type, &definition.callback_ref);
        apply_verdict(&mut definition, &verdict);

        let result = self.backend.insert(&definition).await;
        self.cache.invalidate().await;
        result?;

        tracing::info!(
            endpoint_id = %definition.id,
            route = %definition.full_path(),
            method = %definition.http_method,
            is_safe = definition.is_safe,
            "endpoint definition created"
        );
        Ok(definition)
    }

    /// Replaces a definition. The callback is re-validated only when it changed.
    pub async fn update(&self, id: Uuid, input: DefinitionInput) -> Result<Option<EndpointDefinition>> {
        let Some(previous) = self.backend.get(id).await? else {
            return Ok(None);
        };

        let mut definition = EndpointDefinition::from_input(id, input);
        let callback_changed = definition.callback_type != previous.callback_type
            || definition.callback_ref != previous.callback_ref;
        if callback_changed {
            let verdict = self.validate_only(definition.callback_type, &definition.callback_ref);
            apply_verdict(&mut definition, &verdict);
        } else {
            definition.is_safe = previous.is_safe;
            definition.validation_errors = previous.validation_errors.clone();
        }
        // Listings never show the JWT secret, so an edit without one keeps the stored secret.
        if let (Some(auth), Some(prev_auth)) = (definition.settings.auth.as_mut(), previous.settings.auth.as_ref()) {
            if auth.secret.is_empty() {
                auth.secret = prev_auth.secret.clone();
            }
        }
        // Strictly increasing; response-cache scopes are keyed on it.
        definition.updated_at = Utc::now().max(previous.updated_at + chrono::Duration::microseconds(1));

        let result = self.backend.update(&definition).await;
        self.cache.invalidate().await;
        if !result? {
            return Ok(None);
        }

        tracing::info!(
            endpoint_id = %id,
            route = %definition.full_path(),
            revalidated = callback_changed,
            is_safe = definition.is_safe,
            "endpoint definition updated"
        );
        Ok(Some(definition))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<EndpointDefinition>> {
        self.backend.get(id).await
    }

    pub async fn list_all(&self) -> Result<Vec<EndpointDefinition>> {
        self.backend.list().await
    }

    /// Active definitions, through the cache.
    pub async fn list_eligible(&self) -> Result<Arc<Vec<EndpointDefinition>>> {
        Ok(self.eligible_snapshot().await?.definitions)
    }

    pub async fn eligible_snapshot(&self) -> Result<EligibleSnapshot> {
        if let Some((definitions, generation)) = self.cache.get().await {
            return Ok(EligibleSnapshot {
                definitions,
                generation,
            });
        }

        let generation = self.cache.generation().await;
        let definitions = Arc::new(self.backend.list_active().await?);
        if self.cache.populate(definitions.clone(), generation).await {
            tracing::debug!(count = definitions.len(), generation, "definition cache populated");
        }
        Ok(EligibleSnapshot {
            definitions,
            generation,
        })
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = self.backend.delete(id).await;
        self.cache.invalidate().await;
        let deleted = result?;
        if deleted {
            tracing::info!(endpoint_id = %id, "endpoint definition deleted");
        }
        Ok(deleted)
    }

    pub async fn mark_unsafe(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = self.backend.mark_unsafe(id, message).await;
        self.cache.invalidate().await;
        let marked = result?;
        if marked {
            tracing::warn!(endpoint_id = %id, reason = %message, "endpoint definition marked unsafe");
        }
        Ok(marked)
    }
}

fn apply_verdict(definition: &mut EndpointDefinition, verdict: &ValidationVerdict) {
    definition.is_safe = verdict.ok;
    definition.validation_errors = verdict.error_text();
}
