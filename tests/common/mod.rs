//! Shared setup for the in-process server tests.

#![allow(dead_code)]

use api_maker::domain::endpoint::EndpointRequest;
use api_maker::storage::definitions::MemoryBackend;
use api_maker::transport::http::{create_router, AppState};
use api_maker::{build_state, FunctionRegistry, Settings};
use axum::Router;
use serde_json::{json, Value as JsonValue};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

/// `list_orders`, `count_calls` (reports how often it ran) and `broken_lookup` (panics).
pub fn functions(counter: Arc<AtomicUsize>) -> FunctionRegistry {
    let mut functions = FunctionRegistry::new();
    functions.register("broken_lookup", |_req: EndpointRequest| async move {
        let rows: Vec<JsonValue> = Vec::new();
        let wanted = rows.len() + 3;
        Ok(rows[wanted].clone())
    });
    functions.register("list_orders", |_req: EndpointRequest| async move {
        Ok(json!({ "orders": [{ "id": 1 }, { "id": 2 }] }))
    });
    functions.register("count_calls", move |req: EndpointRequest| {
        let counter = counter.clone();
        async move {
            let calls = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "calls": calls, "user": req.user, "body": req.body }))
        }
    });
    functions
}

pub fn settings(allow_inline_code: bool) -> Settings {
    Settings {
        allow_inline_code,
        ..Settings::default()
    }
}

pub fn state(settings: &Settings, counter: Arc<AtomicUsize>) -> AppState {
    build_state(settings, functions(counter), Arc::new(MemoryBackend::new()))
}

pub fn router(state: AppState) -> Router {
    create_router(state)
}

/// Starts the router on an ephemeral port.
pub async fn spawn(settings: Settings, counter: Arc<AtomicUsize>) -> TestServer {
    let state = state(&settings, counter);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("server");
    });

    TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        state,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POSTs a definition through the admin API and returns the stored view.
    pub async fn create(&self, definition: JsonValue) -> JsonValue {
        let resp = self
            .client
            .post(self.url("/admin/endpoints"))
            .json(&definition)
            .send()
            .await
            .expect("create request");
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: JsonValue = resp.json().await.expect("json");
        assert_eq!(body["success"], true);
        body["data"].clone()
    }
}

pub fn definition(route: &str, method: &str, callback_type: &str, callback_ref: &str) -> JsonValue {
    json!({
        "namespace": "shop",
        "version": "v1",
        "route": route,
        "http_method": method,
        "callback_type": callback_type,
        "callback_ref": callback_ref,
        "status": "active"
    })
}
