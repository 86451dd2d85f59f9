use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::issue_admin_token;
use crate::error::ApiError;
use crate::services::rate_limiter::RateDecision;
use crate::state::AppState;

use super::RequestContext;

const ADMIN_AUTH_ACTION: &str = "admin_auth";

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub code: Option<String>,
}

/// POST /admin/login - exchange the admin access code for a signed token.
///
/// Wrong codes answer 200 with `ok: false` so the client renders a clean
/// message instead of treating it as a transport failure.
pub async fn admin_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdminLoginRequest>,
) -> Response {
    let ctx = RequestContext::from_parts(&headers, &serde_json::Value::Null);

    if let RateDecision::Limited { retry_after_secs } =
        state.rate_limiter().check(&ctx.client_ip, ADMIN_AUTH_ACTION).await
    {
        tracing::info!(ip = %ctx.client_ip, "admin login rate limit exceeded");
        state
            .audit()
            .record("unknown", "login_rate_limited", None, json!({}), &ctx.client_ip)
            .await;
        return ApiError::rate_limited("Too many attempts. Try again later.", retry_after_secs)
            .into_response();
    }

    let Some(submitted) = req.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
        return ApiError::bad_request("Access code required").into_response();
    };

    let expected = state.config.security.admin_secret.as_str();
    if expected.is_empty() {
        tracing::error!("admin secret not configured");
        return ApiError::internal("Server configuration missing").into_response();
    }

    // Never log the submitted code, only the outcome.
    if submitted != expected {
        tracing::info!(ip = %ctx.client_ip, "admin login failed");
        state.audit().record("unknown", "login_failed", None, json!({}), &ctx.client_ip).await;
        return Json(json!({ "ok": false, "error": "Incorrect access code" })).into_response();
    }

    // Success clears the throttle so repeated legitimate logins never lock.
    if let Err(e) = state.stores.rate_limits.remove(&ctx.client_ip, ADMIN_AUTH_ACTION).await {
        tracing::warn!("failed to reset admin login throttle: {}", e);
    }

    let admin_email = state
        .config
        .security
        .admin_emails
        .first()
        .cloned()
        .unwrap_or_else(|| "admin".to_string());
    let ttl = state.config.security.admin_token_ttl_secs;

    let token = match issue_admin_token(&admin_email, Some(&ctx.client_ip), expected, ttl) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("admin token issuance failed: {}", e);
            return ApiError::internal("Token issuance failed").into_response();
        }
    };

    state.audit().record(&admin_email, "login_success", None, json!({}), &ctx.client_ip).await;

    Json(json!({ "ok": true, "token": token, "expiresIn": ttl })).into_response()
}
