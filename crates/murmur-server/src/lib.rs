//! HTTP wiring for the murmur chat backend.

pub mod cleanup;
pub mod config;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use murmur_api::AppState;
use murmur_api::rpc::handle_rpc;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
