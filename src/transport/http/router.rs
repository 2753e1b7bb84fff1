use crate::app::endpoint_registry::RefreshReport;
use crate::domain::compiler::{SkippedDefinition, UnsafeMark};
use crate::domain::definition::{
    AuthSettings, CacheSettings, CallbackType, DefinitionInput, EndpointDefinition, EndpointStatus, HttpMethod,
    MiddlewareSettings, RateLimitKey, RateLimitSettings,
};
use crate::domain::endpoint::RouteSummary;
use crate::domain::validator::{ValidationErrorKind, ValidationVerdict};
use crate::transport::http::handlers::{common, dispatch, endpoints, health};
use crate::transport::http::types::{ApiResponse, AppState, DefinitionView, ValidateRequest};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        endpoints::list_endpoints_handler,
        endpoints::create_endpoint_handler,
        endpoints::get_endpoint_handler,
        endpoints::update_endpoint_handler,
        endpoints::delete_endpoint_handler,
        endpoints::validate_handler,
        endpoints::refresh_handler
    ),
    components(schemas(
        ApiResponse,
        DefinitionInput,
        DefinitionView,
        EndpointDefinition,
        MiddlewareSettings,
        AuthSettings,
        CacheSettings,
        RateLimitSettings,
        RateLimitKey,
        CallbackType,
        EndpointStatus,
        HttpMethod,
        ValidateRequest,
        ValidationVerdict,
        ValidationErrorKind,
        RefreshReport,
        RouteSummary,
        SkippedDefinition,
        UnsafeMark
    ))
)]
pub struct ApiDoc;

fn admin_cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Admin API, health check, and the fallback dispatcher for dynamic routes.
pub fn create_router(app_state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/endpoints",
            get(endpoints::list_endpoints_handler).post(endpoints::create_endpoint_handler),
        )
        .route(
            "/admin/endpoints/:id",
            get(endpoints::get_endpoint_handler)
                .put(endpoints::update_endpoint_handler)
                .delete(endpoints::delete_endpoint_handler),
        )
        .route("/admin/validate", post(endpoints::validate_handler))
        .route("/admin/refresh", post(endpoints::refresh_handler))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            common::require_admin_token,
        ))
        .layer(admin_cors(&app_state.admin_cors_origins));

    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .merge(admin)
        .fallback(dispatch::dispatch_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
