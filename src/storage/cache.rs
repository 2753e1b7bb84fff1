//! Read-through cache for the eligible definition list.

use crate::domain::definition::EndpointDefinition;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

/// Default lifetime of the cached list: five days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

struct Entry {
    definitions: Arc<Vec<EndpointDefinition>>,
    generation: u64,
    expires_at: Instant,
}

struct State {
    entry: Option<Entry>,
    generation: u64,
}

/// A single cache entry with a TTL and a generation counter.
///
/// Every invalidation bumps the generation. A populate carries the generation observed when
/// its read started and is dropped if an invalidation happened in between.
pub struct DefinitionCache {
    ttl: Duration,
    state: RwLock<State>,
}

impl DefinitionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(State {
                entry: None,
                generation: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Cached list and its generation, unless missing or expired.
    pub async fn get(&self) -> Option<(Arc<Vec<EndpointDefinition>>, u64)> {
        let state = self.state.read().await;
        state
            .entry
            .as_ref()
            .filter(|e| e.generation == state.generation && e.expires_at > Instant::now())
            .map(|e| (e.definitions.clone(), e.generation))
    }

    /// Stores `definitions` read at `observed` generation. Returns false if that read is stale.
    pub async fn populate(&self, definitions: Arc<Vec<EndpointDefinition>>, observed: u64) -> bool {
        let mut state = self.state.write().await;
        if state.generation != observed {
            tracing::debug!(observed, current = state.generation, "discarding stale cache populate");
            return false;
        }
        state.entry = Some(Entry {
            definitions,
            generation: observed,
            expires_at: Instant::now() + self.ttl,
        });
        true
    }

    /// Drops the cached list and starts a new generation.
    pub async fn invalidate(&self) -> u64 {
        let mut state = self.state.write().await;
        state.entry = None;
        state.generation += 1;
        tracing::debug!(generation = state.generation, "definition cache invalidated");
        state.generation
    }
}

impl Default for DefinitionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = DefinitionCache::new(Duration::from_secs(10));
        let generation = cache.generation().await;
        assert!(cache.populate(Arc::new(Vec::new()), generation).await);
        assert!(cache.get().await.is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn invalidation_clears_and_bumps_generation() {
        let cache = DefinitionCache::default();
        let g0 = cache.generation().await;
        cache.populate(Arc::new(Vec::new()), g0).await;

        let g1 = cache.invalidate().await;
        assert_eq!(g1, g0 + 1);
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn populate_from_before_an_invalidation_is_discarded() {
        let cache = DefinitionCache::default();
        let observed = cache.generation().await;
        cache.invalidate().await;

        assert!(!cache.populate(Arc::new(Vec::new()), observed).await);
        assert!(cache.get().await.is_none());
    }
}
