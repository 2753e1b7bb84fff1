use super::{Middleware, Next};
use crate::domain::endpoint::{EndpointRequest, EndpointResponse};
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Expired entries are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 4096;

/// Upper bound on how long an entry may live, whatever the endpoint asks for.
const MAX_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct CachedResponse {
    response: EndpointResponse,
    expires_at: Instant,
}

/// Response entries shared by every compiled table, so rebuilding routes keeps them.
#[derive(Default)]
pub struct ResponseStore {
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, signature: &str) -> Option<EndpointResponse> {
        let mut entries = self.entries.lock().await;
        match entries.get(signature) {
            Some(hit) if hit.expires_at > Instant::now() => Some(hit.response.clone()),
            Some(_) => {
                entries.remove(signature);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, signature: String, response: EndpointResponse, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, e| e.expires_at > now);
        }
        entries.insert(
            signature,
            CachedResponse {
                response,
                expires_at: now + ttl.min(MAX_ENTRY_TTL),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Replays a stored response for an identical request signature within the TTL.
pub struct ResponseCache {
    store: Arc<ResponseStore>,
    ttl: Duration,
    /// Endpoint identity and revision; an edited definition never hits old entries.
    scope: String,
}

impl ResponseCache {
    pub fn new(store: Arc<ResponseStore>, ttl: Duration, scope: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            scope: scope.into(),
        }
    }

    /// SHA-256 over scope, method, path, sorted query, body and authenticated user.
    pub fn signature(&self, request: &EndpointRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.scope.as_bytes());
        hasher.update([0]);
        hasher.update(request.method.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(request.path.as_bytes());
        for (k, v) in &request.query {
            hasher.update([0]);
            hasher.update(k.as_bytes());
            hasher.update([b'=']);
            hasher.update(v.as_bytes());
        }
        hasher.update([0]);
        if let Some(body) = &request.body {
            hasher.update(body.to_string().as_bytes());
        }
        hasher.update([0]);
        if let Some(user) = &request.user {
            hasher.update(user.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl Middleware for ResponseCache {
    fn name(&self) -> &'static str {
        "response_cache"
    }

    async fn handle(&self, request: EndpointRequest, next: Next<'_>) -> EndpointResponse {
        let signature = self.signature(&request);
        if let Some(hit) = self.store.get(&signature).await {
            tracing::trace!(path = %request.path, "response cache hit");
            return hit;
        }

        let response = next.run(request).await;
        if response.is_success() {
            let mut stored = response.clone();
            strip_per_caller_headers(&mut stored.headers);
            self.store.put(signature, stored, self.ttl).await;
        }
        response
    }
}

/// CORS and rate-limit headers describe one caller; hits get their own.
fn strip_per_caller_headers(headers: &mut HeaderMap) {
    let per_caller: Vec<_> = headers
        .keys()
        .filter(|name| {
            let name = name.as_str();
            name.starts_with("access-control-") || name.starts_with("x-ratelimit-")
        })
        .cloned()
        .collect();
    for name in per_caller {
        headers.remove(name);
    }
    headers.remove(header::VARY);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::middleware::test_support::{endpoint_with, CountingHandler};
    use axum::http::Method;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn cache(store: &Arc<ResponseStore>, scope: &str) -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(store.clone(), Duration::from_secs(30), scope))
    }

    #[tokio::test(start_paused = true)]
    async fn identical_requests_within_ttl_hit_the_cache() {
        let store = Arc::new(ResponseStore::new());
        let handler = Arc::new(CountingHandler::default());
        let endpoint = endpoint_with(handler.clone(), vec![cache(&store, "GET /test/v1/things@1")]);
        let req = || EndpointRequest::new(Method::POST, "/test/v1/things").with_body(json!({ "a": 1 }));

        let first = endpoint.handle(req()).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = endpoint.handle(req()).await;
        assert_eq!(first, second);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(21)).await;
        let third = endpoint.handle(req()).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(third.body["call"], 2);
    }

    #[tokio::test]
    async fn different_bodies_and_scopes_do_not_share_entries() {
        let store = Arc::new(ResponseStore::new());
        let a = ResponseCache::new(store.clone(), Duration::from_secs(30), "scope-a");
        let b = ResponseCache::new(store.clone(), Duration::from_secs(30), "scope-b");

        let r1 = EndpointRequest::new(Method::POST, "/x/v1/y").with_body(json!({ "a": 1 }));
        let r2 = EndpointRequest::new(Method::POST, "/x/v1/y").with_body(json!({ "a": 2 }));

        assert_ne!(a.signature(&r1), a.signature(&r2));
        assert_ne!(a.signature(&r1), b.signature(&r1));
        assert_eq!(a.signature(&r1), a.signature(&r1.clone()));
    }

    #[tokio::test]
    async fn hits_are_decorated_for_the_current_origin() {
        use crate::domain::definition::HttpMethod;
        use crate::domain::endpoint::{CompiledEndpoint, RouteKey};
        use crate::domain::middleware::Cors;
        use axum::http::header;
        use uuid::Uuid;

        let store = Arc::new(ResponseStore::new());
        let handler = Arc::new(CountingHandler::default());
        let cors = Arc::new(Cors::new(
            vec!["https://a.example".to_string(), "https://b.example".to_string()],
            vec![HttpMethod::Post],
        ));
        let stages: Vec<Arc<dyn Middleware>> = vec![cache(&store, "s"), cors.clone()];
        let endpoint = CompiledEndpoint::new(
            RouteKey::new("test", "v1", "things", HttpMethod::Post),
            Uuid::new_v4(),
            handler.clone(),
            stages,
            cors,
        );
        let req = |origin: &str| {
            EndpointRequest::new(Method::POST, "/test/v1/things").with_header(header::ORIGIN, origin)
        };
        let acao = |resp: &EndpointResponse| {
            resp.headers
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let first = endpoint.handle(req("https://a.example")).await;
        assert_eq!(acao(&first).as_deref(), Some("https://a.example"));

        let second = endpoint.handle(req("https://b.example")).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(acao(&second).as_deref(), Some("https://b.example"));

        let foreign = endpoint.handle(req("https://evil.example")).await;
        assert_eq!(acao(&foreign), None);
    }

    #[tokio::test]
    async fn error_responses_are_not_stored() {
        let store = Arc::new(ResponseStore::new());
        store
            .put(
                "k".to_string(),
                EndpointResponse::ok(json!(1)),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(store.len().await, 1);

        let handler = Arc::new(CountingHandler::default());
        let auth: Arc<dyn Middleware> = Arc::new(crate::domain::middleware::JwtAuth::new("secret"));
        // Auth runs inside the cache here, so the 401 passes through the cache stage.
        let endpoint = endpoint_with(handler, vec![cache(&store, "s"), auth]);
        let resp = endpoint
            .handle(EndpointRequest::new(Method::POST, "/test/v1/things"))
            .await;
        assert_eq!(resp.status, axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(store.len().await, 1);
    }
}
