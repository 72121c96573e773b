//! HTTP transport.
//!
//! Routes:
//! - `GET /health`: liveness, unauthenticated
//! - `GET /hello`: protected by the bearer gate, echoes the verified claims

use axum::{Extension, Json, Router, middleware, response::IntoResponse, routing::get};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::{BearerGate, Claims, require_bearer};

/// Body of `GET /hello`.
#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
    pub user: Claims,
}

/// Create the HTTP router with the gate mounted in front of protected routes.
pub fn create_router(gate: BearerGate) -> Router {
    let protected = Router::new()
        .route("/hello", get(handle_hello))
        .route_layer(middleware::from_fn_with_state(gate, require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pkce-gate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Only reachable once the gate has attached [`Claims`].
async fn handle_hello(Extension(claims): Extension<Claims>) -> Json<HelloResponse> {
    Json(HelloResponse { message: "Hello! Your token is valid.", user: claims })
}
