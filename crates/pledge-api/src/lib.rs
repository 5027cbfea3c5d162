pub mod auth;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod promises;
pub mod qr;
pub mod uploads;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use auth::AppState;
use middleware::require_auth;

/// All HTTP routes. Cross-cutting layers (CORS, tracing) are added by the
/// binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/callback/credentials", post(auth::sign_in_with_credentials))
        .route("/api/promises/{id}", get(promises::get_promise))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/session", get(auth::session))
        .route(
            "/api/promises/create",
            post(promises::create_promise).layer(DefaultBodyLimit::max(uploads::MAX_BODY_SIZE)),
        )
        .route("/api/promises/list", get(promises::list_promises))
        .route("/api/promises/forfeit/{id}", post(promises::forfeit_promise))
        .route("/api/promises/qr/{id}", get(promises::promise_qr_code))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
