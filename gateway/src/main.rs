//! HTTP gateway fronting the AI providers.
//!
//! Exposes a single generation endpoint with the provider-neutral contract;
//! provider wire formats and server-held API keys never leave this process.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use momgen_core::errors::GatewayError;
use momgen_core::gateway::{Gateway, GatewayConfig, GenerationRequest, GenerationResult};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GatewayConfig::from_env();
    let gateway = Arc::new(Gateway::new(config)?);
    let app = router(gateway);

    let addr = std::env::var("MOMGEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("gateway listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route(
            "/api/generate",
            post(generate).fallback(method_not_allowed),
        )
        .route("/api/health", get(health).fallback(method_not_allowed))
        .with_state(gateway)
}

async fn generate(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResult>, ApiError> {
    let result = gateway.handle(&request).await?;
    Ok(Json(result))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn method_not_allowed() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        log::error!("[{}] generation failed: {err}", err.code());
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": err.to_string() }))).into_response()
    }
}
