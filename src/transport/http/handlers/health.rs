use crate::transport::http::types::{ApiResponse, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy (route table builds)", body = ApiResponse),
        (status = 503, description = "Service is unhealthy (definitions unreadable)", body = ApiResponse)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.current().await {
        Ok(table) => (
            StatusCode::OK,
            Json(ApiResponse::ok(serde_json::json!({
                "status": "ok",
                "routes": table.len(),
            }))),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                data: Some(serde_json::json!({ "status": "unhealthy" })),
                error: Some(format!("Route table rebuild failed: {}", e)),
            }),
        )
            .into_response(),
    }
}
