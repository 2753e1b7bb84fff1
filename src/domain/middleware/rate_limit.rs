use super::{Middleware, Next};
use crate::domain::definition::RateLimitKey;
use crate::domain::endpoint::{EndpointRequest, EndpointResponse};
use async_trait::async_trait;
use axum::http::{header, HeaderName, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

struct Window {
    started: Instant,
    length: Duration,
    count: u32,
}

/// Fixed-window counters shared across route-table rebuilds.
///
/// Every check-and-increment happens under one lock, so concurrent bursts never undercount.
#[derive(Default)]
pub struct RateLimitStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn hit(&self, key: &str, max_calls: u32, length: Duration) -> RateDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < w.length);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            length,
            count: 0,
        });
        if now.duration_since(window.started) >= window.length {
            window.started = now;
            window.length = length;
            window.count = 0;
        }

        if window.count >= max_calls {
            let retry_after = window.length.saturating_sub(now.duration_since(window.started));
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: max_calls - window.count,
        }
    }
}

pub struct RateLimit {
    store: Arc<RateLimitStore>,
    max_calls: u32,
    window: Duration,
    key_by: RateLimitKey,
    /// Route identity; counters never leak between endpoints.
    scope: String,
}

impl RateLimit {
    pub fn new(
        store: Arc<RateLimitStore>,
        max_calls: u32,
        window: Duration,
        key_by: RateLimitKey,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            store,
            max_calls,
            window,
            key_by,
            scope: scope.into(),
        }
    }

    /// Counter key for this request. Anonymous callers of a per-user limit count by IP.
    pub fn counter_key(&self, request: &EndpointRequest) -> String {
        let ip = request.client_ip.as_deref().unwrap_or("unknown");
        let subject = match (self.key_by, request.user.as_deref()) {
            (RateLimitKey::Ip, _) => format!("ip:{}", ip),
            (RateLimitKey::User, Some(user)) => format!("user:{}", user),
            (RateLimitKey::User, None) => format!("ip:{}", ip),
            (RateLimitKey::Endpoint, _) => "endpoint".to_string(),
        };
        format!("{}|{}", self.scope, subject)
    }
}

#[async_trait]
impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, request: EndpointRequest, next: Next<'_>) -> EndpointResponse {
        let key = self.counter_key(&request);
        match self.store.hit(&key, self.max_calls, self.window).await {
            RateDecision::Allowed { remaining } => {
                let mut response = next.run(request).await;
                response.set_header(
                    HeaderName::from_static("x-ratelimit-limit"),
                    &self.max_calls.to_string(),
                );
                response.set_header(
                    HeaderName::from_static("x-ratelimit-remaining"),
                    &remaining.to_string(),
                );
                response
            }
            RateDecision::Limited { retry_after } => {
                tracing::info!(key = %key, "rate limit exceeded");
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let mut response =
                    EndpointResponse::error(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
                response.set_header(header::RETRY_AFTER, &secs.max(1).to_string());
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::middleware::test_support::{endpoint_with, CountingHandler};
    use axum::http::Method;
    use std::sync::atomic::Ordering;

    fn limiter(store: &Arc<RateLimitStore>, key_by: RateLimitKey) -> RateLimit {
        RateLimit::new(store.clone(), 5, Duration::from_secs(60), key_by, "POST /test/v1/things")
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_call_in_window_is_limited() {
        let store = Arc::new(RateLimitStore::new());
        let handler = Arc::new(CountingHandler::default());
        let endpoint = endpoint_with(handler.clone(), vec![Arc::new(limiter(&store, RateLimitKey::Ip))]);
        let req = || EndpointRequest::new(Method::POST, "/test/v1/things").with_client_ip("10.0.0.1");

        for _ in 0..5 {
            assert_eq!(endpoint.handle(req()).await.status, StatusCode::OK);
        }
        let limited = endpoint.handle(req()).await;
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers.contains_key(header::RETRY_AFTER));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
        // Rejected before the CORS stage, still readable by browsers.
        assert_eq!(
            limited.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("*")
        );

        // Another client has its own window.
        let other = EndpointRequest::new(Method::POST, "/test/v1/things").with_client_ip("10.0.0.2");
        assert_eq!(endpoint.handle(other).await.status, StatusCode::OK);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(endpoint.handle(req()).await.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn concurrent_burst_never_exceeds_limit() {
        let store = Arc::new(RateLimitStore::new());
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.hit("burst", 5, Duration::from_secs(60)).await
            }));
        }
        let mut allowed = 0;
        for t in tasks {
            if matches!(t.await.expect("join"), RateDecision::Allowed { .. }) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn counter_keys_follow_key_by() {
        let store = Arc::new(RateLimitStore::new());
        let mut req = EndpointRequest::new(Method::POST, "/test/v1/things").with_client_ip("1.2.3.4");

        assert!(limiter(&store, RateLimitKey::Ip).counter_key(&req).ends_with("|ip:1.2.3.4"));
        assert!(limiter(&store, RateLimitKey::User).counter_key(&req).ends_with("|ip:1.2.3.4"));
        req.user = Some("alice".to_string());
        assert!(limiter(&store, RateLimitKey::User).counter_key(&req).ends_with("|user:alice"));
        assert!(limiter(&store, RateLimitKey::Endpoint).counter_key(&req).ends_with("|endpoint"));
    }
}
