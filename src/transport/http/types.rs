use crate::app::definition_store::DefinitionStore;
use crate::app::endpoint_registry::EndpointRegistry;
use crate::domain::definition::{specifications, CallbackType, EndpointDefinition};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EndpointRegistry>,
    pub store: Arc<DefinitionStore>,
    /// Bearer token required on `/admin/*` when set.
    pub admin_token: Option<Arc<str>>,
    /// Origins allowed to call the admin API from a browser.
    pub admin_cors_origins: Vec<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// A stored definition as shown in admin listings.
#[derive(Serialize, Debug, ToSchema)]
pub struct DefinitionView {
    #[serde(flatten)]
    pub definition: EndpointDefinition,
    /// Full URL of the route (path only when the request carried no `Host`).
    pub url: String,
    /// `active`, `inactive`, or `Inactive: Unsafe`.
    pub status_label: String,
    /// e.g. `JWT Enabled`, `Cache: 30 seconds`, `Rate Limited by ip: 5 calls per 1 minute`.
    pub specifications: Vec<String>,
}

impl DefinitionView {
    pub fn new(mut definition: EndpointDefinition, host: Option<&str>) -> Self {
        if let Some(auth) = definition.settings.auth.as_mut() {
            auth.secret.clear();
        }
        let path = definition.full_path();
        let url = match host {
            Some(host) => format!("http://{}{}", host, path),
            None => path,
        };
        Self {
            status_label: definition.status_label().to_string(),
            specifications: specifications(&definition),
            url,
            definition,
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ValidateRequest {
    pub callback_type: CallbackType,
    pub callback_ref: String,
}

pub fn json_422(err: JsonRejection, expected: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiResponse::err(format!(
            "Invalid JSON body: {} (expected: {})",
            err, expected
        ))),
    )
}

pub fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ApiResponse>) {
    tracing::error!(error = %err, "admin request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err("Internal server error")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::{AuthSettings, DefinitionInput, EndpointStatus, MiddlewareSettings};
    use uuid::Uuid;

    #[test]
    fn view_never_exposes_the_jwt_secret() {
        let input = DefinitionInput {
            namespace: "shop".to_string(),
            version: "v1".to_string(),
            route: "orders".to_string(),
            http_method: "GET".to_string(),
            callback_type: CallbackType::NamedFunction,
            callback_ref: "list_orders".to_string(),
            status: EndpointStatus::Active,
            settings: MiddlewareSettings {
                auth: Some(AuthSettings {
                    jwt_enabled: true,
                    secret: "s3cret".to_string(),
                }),
                ..MiddlewareSettings::default()
            },
        };
        let definition = EndpointDefinition::from_input(Uuid::new_v4(), input);

        let json = serde_json::to_value(DefinitionView::new(definition, Some("api.example"))).expect("json");
        assert_eq!(json["auth"], serde_json::json!({ "jwt_enabled": true }));
        assert!(!json.to_string().contains("s3cret"));
        assert_eq!(json["url"], "http://api.example/shop/v1/orders");
        assert_eq!(json["specifications"], serde_json::json!(["JWT Enabled"]));
    }
}
