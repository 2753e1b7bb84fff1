//! Fallback handler serving every dynamically defined route.

use crate::domain::definition::HttpMethod;
use crate::domain::endpoint::{EndpointRequest, EndpointResponse, RouteMatch};
use crate::transport::http::handlers::common::client_ip;
use crate::transport::http::types::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::net::SocketAddr;

pub async fn dispatch_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let table = match state.registry.current().await {
        Ok(table) => table,
        Err(e) => {
            tracing::error!(error = %e, "route table unavailable");
            return EndpointResponse::internal_error().into_response();
        }
    };

    let path = uri.path().to_string();
    let query = match Query::<BTreeMap<String, String>>::try_from_uri(&uri) {
        Ok(Query(query)) => query,
        Err(e) => {
            return EndpointResponse::error(StatusCode::BAD_REQUEST, format!("Invalid query string: {}", e))
                .into_response()
        }
    };

    let mut request = EndpointRequest::new(method.clone(), path.clone());
    request.query = query;
    request.headers = headers;
    request.client_ip = client_ip(&request.headers, peer.map(|ConnectInfo(addr)| addr));

    if method == Method::OPTIONS {
        let endpoints = table.endpoints_at(&path);
        let Some(first) = endpoints.first() else {
            return not_found(&path);
        };
        let allowed: Vec<HttpMethod> = endpoints.iter().map(|e| e.key.method).collect();
        return first.preflight(&request, &allowed).into_response();
    }

    match table.resolve(&path, &method) {
        RouteMatch::Found(endpoint) => {
            request.body = match parse_body(&body) {
                Ok(body) => body,
                Err(response) => return response,
            };
            tracing::debug!(route = %endpoint.key, endpoint_id = %endpoint.definition_id, "dispatching");
            endpoint.handle(request).await.into_response()
        }
        RouteMatch::MethodNotAllowed(allowed) => {
            let mut listed: Vec<&str> = allowed.iter().map(HttpMethod::as_str).collect();
            listed.push("OPTIONS");
            let mut response = EndpointResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
            response.set_header(header::ALLOW, &listed.join(", "));
            response.into_response()
        }
        RouteMatch::NotFound => not_found(&path),
    }
}

fn parse_body(body: &Bytes) -> Result<Option<JsonValue>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(|_| {
        EndpointResponse::error(StatusCode::BAD_REQUEST, "Request body must be valid JSON").into_response()
    })
}

fn not_found(path: &str) -> Response {
    EndpointResponse::error(StatusCode::NOT_FOUND, format!("No route found for '{}'", path)).into_response()
}
