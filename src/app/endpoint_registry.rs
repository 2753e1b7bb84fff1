//! The live route table and its rebuild cycle.

use crate::app::definition_store::DefinitionStore;
use crate::domain::compiler::{EndpointCompiler, SkippedDefinition, UnsafeMark};
use crate::domain::endpoint::{RouteSummary, RouteTable};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use utoipa::ToSchema;

struct Installed {
    table: Arc<RouteTable>,
    /// Cache generation the table was compiled from; `None` before the first build.
    generation: Option<u64>,
    built_at: Instant,
}

/// Result of one rebuild, returned by the admin refresh endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshReport {
    pub generation: u64,
    pub installed: bool,
    pub routes: Vec<RouteSummary>,
    pub skipped: Vec<SkippedDefinition>,
    pub unsafe_marks: Vec<UnsafeMark>,
}

/// Owns the compiled [`RouteTable`]; readers get an `Arc` and never see a partial rebuild.
pub struct EndpointRegistry {
    store: Arc<DefinitionStore>,
    compiler: EndpointCompiler,
    installed: RwLock<Installed>,
}

impl EndpointRegistry {
    pub fn new(store: Arc<DefinitionStore>, compiler: EndpointCompiler) -> Self {
        Self {
            store,
            compiler,
            installed: RwLock::new(Installed {
                table: Arc::new(RouteTable::new()),
                generation: None,
                built_at: Instant::now(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<DefinitionStore> {
        &self.store
    }

    /// The table for the current definitions, rebuilding first when it is out of date.
    pub async fn current(&self) -> Result<Arc<RouteTable>> {
        let generation = self.store.generation().await;
        {
            let installed = self.installed.read().await;
            let fresh = installed.built_at.elapsed() < self.store.cache().ttl();
            if installed.generation == Some(generation) && fresh {
                return Ok(installed.table.clone());
            }
        }
        self.refresh().await?;
        Ok(self.installed.read().await.table.clone())
    }

    /// The installed table without checking for changes.
    pub async fn installed(&self) -> Arc<RouteTable> {
        self.installed.read().await.table.clone()
    }

    /// Recompiles from the store and swaps the result in.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let snapshot = self.store.eligible_snapshot().await?;
        let outcome = self.compiler.compile(&snapshot.definitions);

        for mark in &outcome.unsafe_marks {
            self.store.mark_unsafe(mark.definition_id, &mark.message).await?;
        }

        let routes = outcome.table.summaries();
        let table = Arc::new(outcome.table);
        let installed = {
            let mut current = self.installed.write().await;
            // Never let a build from an older generation replace a newer one.
            if current.generation.map_or(true, |g| g <= snapshot.generation) {
                *current = Installed {
                    table,
                    generation: Some(snapshot.generation),
                    built_at: Instant::now(),
                };
                true
            } else {
                false
            }
        };

        tracing::info!(
            generation = snapshot.generation,
            routes = routes.len(),
            skipped = outcome.skipped.len(),
            installed,
            "route table rebuilt"
        );

        Ok(RefreshReport {
            generation: snapshot.generation,
            installed,
            routes,
            skipped: outcome.skipped,
            unsafe_marks: outcome.unsafe_marks,
        })
    }
}
