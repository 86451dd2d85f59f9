use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

/// Build the application router. Cross-origin requests are permitted broadly
/// and pre-flight requests short-circuit inside the CORS layer.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root).post(handlers::action_post))
        .route("/health", get(health))
        .route("/admin/login", post(handlers::admin_login::admin_login))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "License API (Rust)",
            "version": version,
            "description": "License validation and authorization backend",
            "endpoints": {
                "actions": "POST / with an action field (validate, check, admin operations)",
                "admin_login": "POST /admin/login (access code -> signed token)",
                "health": "GET /health",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    let storage = match &state.pool {
        Some(pool) => crate::database::manager::DatabaseManager::health_check(pool)
            .await
            .map_err(|e| e.to_string()),
        // The memory backend has nothing to ping.
        None => Ok(()),
    };

    match storage {
        Ok(()) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "storage": "ok" }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "storage unavailable",
                "data": { "status": "degraded", "timestamp": now, "storage_error": e }
            })),
        ),
    }
}
