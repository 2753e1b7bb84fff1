//! Wires settings, storage, compiler and registry into an [`AppState`].

use crate::app::definition_store::DefinitionStore;
use crate::app::endpoint_registry::EndpointRegistry;
use crate::domain::compiler::EndpointCompiler;
use crate::domain::functions::FunctionRegistry;
use crate::domain::middleware::{RateLimitStore, ResponseStore};
use crate::infra::config::Settings;
use crate::infra::sandbox::Sandbox;
use crate::storage::cache::DefinitionCache;
use crate::storage::definitions::{DefinitionBackend, MemoryBackend, PostgresBackend};
use crate::transport::http::AppState;
use anyhow::Result;
use std::sync::Arc;

/// PostgreSQL when `DATABASE_URL` is configured, in-memory otherwise.
pub async fn connect_backend(settings: &Settings) -> Result<Arc<dyn DefinitionBackend>> {
    match settings.database_url.as_deref() {
        Some(url) => {
            tracing::info!("using PostgreSQL definition backend");
            Ok(Arc::new(PostgresBackend::connect(url).await?))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, definitions are kept in memory only");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

pub fn build_state(
    settings: &Settings,
    functions: FunctionRegistry,
    backend: Arc<dyn DefinitionBackend>,
) -> AppState {
    let functions = Arc::new(functions);
    let store = Arc::new(DefinitionStore::new(
        backend,
        DefinitionCache::new(settings.definitions_cache_ttl),
        functions.clone(),
    ));
    let compiler = EndpointCompiler::new(
        functions,
        Arc::new(Sandbox::new(settings.sandbox.clone())),
        Arc::new(ResponseStore::new()),
        Arc::new(RateLimitStore::new()),
    )
    .allow_inline_code(settings.allow_inline_code)
    .cors_origins(settings.cors_allowed_origins.clone());

    AppState {
        registry: Arc::new(EndpointRegistry::new(store.clone(), compiler)),
        store,
        admin_token: settings.admin_token.as_deref().map(Arc::from),
        admin_cors_origins: settings.cors_allowed_origins.clone(),
    }
}
