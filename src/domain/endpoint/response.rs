use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};

/// Response produced by a compiled endpoint, before it becomes an HTTP response.
///
/// Kept as plain data so the response cache can store and replay it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: JsonValue,
}

impl EndpointResponse {
    pub fn ok(body: JsonValue) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn with_status(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Error envelope shared by every rejection: `{success: false, error}`.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_status(
            status,
            json!({
                "success": false,
                "error": message.into(),
            }),
        )
    }

    /// Opaque 500 for callback faults. Internal detail goes to the log only.
    pub fn internal_error() -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn no_content() -> Self {
        Self::with_status(StatusCode::NO_CONTENT, JsonValue::Null)
    }

    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(v) = HeaderValue::from_str(value) {
            self.headers.insert(name, v);
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl IntoResponse for EndpointResponse {
    fn into_response(self) -> Response {
        if self.status == StatusCode::NO_CONTENT {
            return (self.status, self.headers).into_response();
        }
        (self.status, self.headers, Json(self.body)).into_response()
    }
}
