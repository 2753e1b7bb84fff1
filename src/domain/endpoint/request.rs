use axum::http::{header, HeaderMap, Method};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

/// A request as seen by the middleware chain and the endpoint callback.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub method: Method,
    pub path: String,
    /// Sorted so cache signatures do not depend on parameter order.
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub body: Option<JsonValue>,
    pub client_ip: Option<String>,
    /// Set by the auth stage from the token subject.
    pub user: Option<String>,
}

impl EndpointRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: None,
            client_ip: None,
            user: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(v) = header::HeaderValue::from_str(value) {
            self.headers.insert(name, v);
        }
        self
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Token from `Authorization: Bearer <token>`, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        parse_bearer(self.header(header::AUTHORIZATION)?)
    }

    pub fn params(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .query
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        JsonValue::Object(map)
    }

    /// The document validated against an endpoint schema: the body, else the query object.
    pub fn input(&self) -> JsonValue {
        self.body.clone().unwrap_or_else(|| self.params())
    }

    /// The `request` value handed to callbacks.
    pub fn to_callback_value(&self) -> JsonValue {
        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "params": self.params(),
            "body": self.body.clone().unwrap_or(JsonValue::Null),
            "user": self.user,
            "client_ip": self.client_ip,
        })
    }
}

/// Token of an `Authorization` value using the `Bearer` scheme (case-insensitive).
pub fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let req = EndpointRequest::new(Method::GET, "/a/v1/b")
            .with_header(header::AUTHORIZATION, "Bearer abc.def");
        assert_eq!(req.bearer_token(), Some("abc.def"));

        let req = EndpointRequest::new(Method::GET, "/a/v1/b")
            .with_header(header::AUTHORIZATION, "Basic abc");
        assert_eq!(req.bearer_token(), None);

        let req = EndpointRequest::new(Method::GET, "/a/v1/b")
            .with_header(header::AUTHORIZATION, "Bearer   ");
        assert_eq!(req.bearer_token(), None);
    }

    #[test]
    fn input_prefers_body_over_query() {
        let req = EndpointRequest::new(Method::GET, "/a/v1/b").with_query("page", "2");
        assert_eq!(req.input(), json!({ "page": "2" }));

        let req = req.with_body(json!({ "name": "x" }));
        assert_eq!(req.input(), json!({ "name": "x" }));
    }
}
