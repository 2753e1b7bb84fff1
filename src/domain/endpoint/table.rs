use super::{CompiledEndpoint, RouteKey};
use crate::domain::definition::HttpMethod;
use axum::http::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Immutable once built; the registry swaps whole tables instead of editing one.
#[derive(Default)]
pub struct RouteTable {
    routes: BTreeMap<RouteKey, Arc<CompiledEndpoint>>,
}

pub enum RouteMatch {
    Found(Arc<CompiledEndpoint>),
    MethodNotAllowed(Vec<HttpMethod>),
    NotFound,
}

/// Structural view of one route, used by listings and for comparing tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RouteSummary {
    pub path: String,
    pub method: HttpMethod,
    pub definition_id: Uuid,
    pub handler: String,
    pub middlewares: Vec<String>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint; returns the one it replaced under the same key.
    pub fn insert(&mut self, endpoint: CompiledEndpoint) -> Option<Arc<CompiledEndpoint>> {
        self.routes.insert(endpoint.key.clone(), Arc::new(endpoint))
    }

    pub fn get(&self, key: &RouteKey) -> Option<Arc<CompiledEndpoint>> {
        self.routes.get(key).cloned()
    }

    pub fn endpoints_at(&self, path: &str) -> Vec<Arc<CompiledEndpoint>> {
        HttpMethod::ALL
            .iter()
            .filter_map(|m| RouteKey::from_path(path, *m))
            .filter_map(|key| self.get(&key))
            .collect()
    }

    pub fn resolve(&self, path: &str, method: &Method) -> RouteMatch {
        if let Some(found) = HttpMethod::from_http(method)
            .and_then(|m| RouteKey::from_path(path, m))
            .and_then(|key| self.get(&key))
        {
            return RouteMatch::Found(found);
        }

        let allowed: Vec<HttpMethod> = self.endpoints_at(path).iter().map(|e| e.key.method).collect();
        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed(allowed)
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.routes
            .values()
            .map(|e| RouteSummary {
                path: e.key.path(),
                method: e.key.method,
                definition_id: e.definition_id,
                handler: e.handler_kind().to_string(),
                middlewares: e.middleware_names().into_iter().map(str::to_string).collect(),
            })
            .collect()
    }
}
