use crate::app::endpoint_registry::RefreshReport;
use crate::domain::definition::DefinitionInput;
use crate::domain::validator::ValidationVerdict;
use crate::transport::http::handlers::common::host;
use crate::transport::http::types::{
    internal_error, json_422, ApiResponse, AppState, DefinitionView, ValidateRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

const DEFINITION_SHAPE: &str =
    "{\"namespace\", \"version\", \"route\", \"http_method\", \"callback_type\", \"callback_ref\", ...}";

fn not_found(id: Uuid) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::err(format!("Endpoint definition '{}' not found", id))),
    )
}

fn view_json(view: DefinitionView) -> serde_json::Value {
    serde_json::to_value(view).unwrap_or(serde_json::Value::Null)
}

#[utoipa::path(
    get,
    path = "/admin/endpoints",
    responses(
        (status = 200, description = "All stored endpoint definitions", body = ApiResponse),
        (status = 401, description = "Missing or invalid admin token", body = ApiResponse)
    )
)]
pub async fn list_endpoints_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match state.store.list_all().await {
        Ok(definitions) => {
            let views: Vec<serde_json::Value> = definitions
                .into_iter()
                .map(|d| view_json(DefinitionView::new(d, host(&headers))))
                .collect();
            (StatusCode::OK, Json(ApiResponse::ok(views.into()))).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/admin/endpoints",
    request_body = DefinitionInput,
    responses(
        (status = 201, description = "Definition stored; `is_safe` reflects validation", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn create_endpoint_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Result<Json<DefinitionInput>, JsonRejection>,
) -> impl IntoResponse {
    let Json(input) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, DEFINITION_SHAPE).into_response(),
    };

    match state.store.create(input).await {
        Ok(definition) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(view_json(DefinitionView::new(definition, host(&headers))))),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/admin/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Definition id")),
    responses(
        (status = 200, description = "The definition", body = ApiResponse),
        (status = 404, description = "No such definition", body = ApiResponse)
    )
)]
pub async fn get_endpoint_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get(id).await {
        Ok(Some(definition)) => (
            StatusCode::OK,
            Json(ApiResponse::ok(view_json(DefinitionView::new(definition, host(&headers))))),
        )
            .into_response(),
        Ok(None) => not_found(id).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/admin/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Definition id")),
    request_body = DefinitionInput,
    responses(
        (status = 200, description = "Definition replaced; callback re-validated if it changed", body = ApiResponse),
        (status = 404, description = "No such definition", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn update_endpoint_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    request: Result<Json<DefinitionInput>, JsonRejection>,
) -> impl IntoResponse {
    let Json(input) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, DEFINITION_SHAPE).into_response(),
    };

    match state.store.update(id, input).await {
        Ok(Some(definition)) => (
            StatusCode::OK,
            Json(ApiResponse::ok(view_json(DefinitionView::new(definition, host(&headers))))),
        )
            .into_response(),
        Ok(None) => not_found(id).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/endpoints/{id}",
    params(("id" = Uuid, Path, description = "Definition id")),
    responses(
        (status = 200, description = "Definition deleted", body = ApiResponse),
        (status = 404, description = "No such definition", body = ApiResponse)
    )
)]
pub async fn delete_endpoint_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.store.delete(id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::ok(serde_json::json!({ "deleted": id }))),
        )
            .into_response(),
        Ok(false) => not_found(id).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/admin/validate",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Validation verdict (nothing is stored)", body = ValidationVerdict),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn validate_handler(
    State(state): State<AppState>,
    request: Result<Json<ValidateRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => {
            return json_422(e, "{\"callback_type\": \"inline_code\", \"callback_ref\": \"...\"}")
                .into_response()
        }
    };
    let verdict = state
        .store
        .validate_only(request.callback_type, &request.callback_ref);
    (StatusCode::OK, Json(verdict)).into_response()
}

#[utoipa::path(
    post,
    path = "/admin/refresh",
    responses(
        (status = 200, description = "Route table rebuilt", body = RefreshReport),
        (status = 500, description = "Definitions could not be read", body = ApiResponse)
    )
)]
pub async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.refresh().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
