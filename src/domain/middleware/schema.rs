use super::{Middleware, Next};
use crate::domain::endpoint::{EndpointRequest, EndpointResponse};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{json, Value as JsonValue};

/// Rejects requests whose input does not match the endpoint's JSON schema.
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Fails when the schema document itself is invalid.
    pub fn new(schema: &JsonValue) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Self { validator })
    }

    /// Validation messages for `instance`, empty when it conforms.
    pub fn errors(&self, instance: &JsonValue) -> Vec<String> {
        self.validator.iter_errors(instance).map(|e| e.to_string()).collect()
    }
}

#[async_trait]
impl Middleware for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    async fn handle(&self, request: EndpointRequest, next: Next<'_>) -> EndpointResponse {
        let errors = self.errors(&request.input());
        if errors.is_empty() {
            return next.run(request).await;
        }

        tracing::debug!(path = %request.path, errors = ?errors, "request rejected by schema");
        EndpointResponse::with_status(
            StatusCode::BAD_REQUEST,
            json!({
                "success": false,
                "error": "Request does not match the endpoint schema",
                "details": errors,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::middleware::test_support::{endpoint_with, CountingHandler};
    use axum::http::Method;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn schema() -> JsonValue {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" }, "qty": { "type": "integer", "minimum": 1 } }
        })
    }

    #[test]
    fn invalid_schema_document_is_rejected() {
        assert!(SchemaValidator::new(&json!({ "type": 12 })).is_err());
    }

    #[tokio::test]
    async fn non_conforming_body_gets_400_without_calling_handler() {
        let handler = Arc::new(CountingHandler::default());
        let stage = Arc::new(SchemaValidator::new(&schema()).expect("schema"));
        let endpoint = endpoint_with(handler.clone(), vec![stage]);

        let req = EndpointRequest::new(Method::POST, "/test/v1/things").with_body(json!({ "qty": 0 }));
        let resp = endpoint.handle(req).await;

        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["success"], false);
        assert!(resp.body["details"].as_array().is_some_and(|d| !d.is_empty()));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn conforming_body_reaches_handler() {
        let handler = Arc::new(CountingHandler::default());
        let stage = Arc::new(SchemaValidator::new(&schema()).expect("schema"));
        let endpoint = endpoint_with(handler.clone(), vec![stage]);

        let req = EndpointRequest::new(Method::POST, "/test/v1/things")
            .with_body(json!({ "name": "widget", "qty": 2 }));
        let resp = endpoint.handle(req).await;

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
