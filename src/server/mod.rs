//! The axum router, grouped into authenticated chat/messages
//! routes and unauthenticated health/stats routes.

pub mod handlers;
pub mod middleware;
pub mod request_id;

use std::time::Duration;

use axum::http::{header, HeaderName, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::pipeline::AppState;

/// Builds the full router for the given [`AppState`]. `/` is always open;
/// `/api/stats` is gated by `stats_auth_enabled`; the two chat surfaces
/// always require a client key.
pub fn build_router(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .route("/v1/messages", post(handlers::messages::messages))
        .route("/v1/models", get(handlers::models::list_models))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_client_key));

    let stats_routes = if state.config.stats_auth_enabled {
        Router::new()
            .route("/api/stats", get(handlers::stats::stats))
            .route_layer(from_fn_with_state(state.clone(), middleware::require_client_key))
    } else {
        Router::new().route("/api/stats", get(handlers::stats::stats))
    };

    Router::new()
        .route("/", get(handlers::health::health))
        .merge(chat_routes)
        .merge(stats_routes)
        .layer(from_fn_with_state(state.clone(), request_id::assign_request_id))
        .layer(cors_layer())
        .with_state(state)
}

/// CORS headers fixed to exactly what the two chat surfaces and the stats
/// endpoint need, rather than reflecting back whatever the caller sends.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(86400))
}
