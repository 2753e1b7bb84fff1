// src/bin/api_server.rs

use api_maker::domain::functions::builtin::register_builtins;
use api_maker::infra::telemetry::init_tracing;
use api_maker::{build_state, connect_backend, transport, FunctionRegistry, Settings};
use std::net::SocketAddr;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::from_env()?;

    let mut functions = FunctionRegistry::new();
    register_builtins(&mut functions);
    tracing::info!(functions = ?functions.names(), "function registry initialized");

    let backend = connect_backend(&settings).await?;
    let app_state = build_state(&settings, functions, backend);

    // Warm start: compile whatever is already stored before accepting traffic.
    let report = app_state.registry.refresh().await?;
    tracing::info!(
        routes = report.routes.len(),
        skipped = report.skipped.len(),
        inline_code = settings.allow_inline_code,
        "initial route table compiled"
    );

    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()));
    let listener = tokio::net::TcpListener::bind(settings.listen_addr).await?;
    tracing::info!(addr = %settings.listen_addr, "API server listening");
    tracing::info!("Swagger UI available at /swagger-ui");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
