use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::services::resolver::normalize_code;
use crate::state::AppState;

use super::CodeEmailRequest;

/// Nudge every member of a company to refresh their cached license: bump
/// last_used_at (clients watch it for cache invalidation) and report how many
/// active members the refresh reaches.
pub async fn sync_company(
    state: &AppState,
    req: CodeEmailRequest,
) -> Result<Json<Value>, ApiError> {
    let (Some(code), Some(_email)) = (req.license_code, req.email) else {
        return Err(ApiError::bad_request("License code and email are required"));
    };

    let license = state
        .stores
        .licenses
        .find_by_code(&normalize_code(&code))
        .await?
        .ok_or_else(|| ApiError::not_found("License not found"))?;

    let members = state.stores.memberships.list_active_for_license(license.id).await?;
    state.stores.licenses.touch_last_used(license.id, state.clock.now()).await?;

    tracing::info!(
        company = license.company_name.as_deref().unwrap_or("-"),
        count = members.len(),
        "company sync requested"
    );

    Ok(Json(json!({
        "success": true,
        "syncedCount": members.len(),
        "companyName": license.company_name,
        "planTier": license.plan_tier,
    })))
}
