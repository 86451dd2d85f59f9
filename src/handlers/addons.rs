use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::services::resolver::{normalize_code, normalize_email};
use crate::state::AppState;

use super::{
    require_admin, to_value, AdminAddonsRequest, CodeEmailRequest, LicenseIdRequest,
    RequestContext, UpdateAddonsRequest,
};

/// Self-service: list the caller's active add-ons. Owner-scoped; members
/// manage add-ons through their owner.
pub async fn get_addons(
    state: &AppState,
    req: CodeEmailRequest,
) -> Result<Json<Value>, ApiError> {
    let (Some(code), Some(email)) = (req.license_code, req.email) else {
        return Err(ApiError::bad_request("License code and email are required"));
    };

    let license = state
        .stores
        .licenses
        .find_by_code(&normalize_code(&code))
        .await?
        .filter(|l| l.email == normalize_email(&email))
        .ok_or_else(|| ApiError::not_found("License not found"))?;

    let addons = state.stores.addons.active_for_license(license.id).await?;
    Ok(Json(json!({ "success": true, "addons": to_value(&addons)? })))
}

/// Self-service: replace the caller's active add-on set.
pub async fn update_addons(
    state: &AppState,
    req: UpdateAddonsRequest,
) -> Result<Json<Value>, ApiError> {
    let (Some(code), Some(email)) = (req.license_code, req.email) else {
        return Err(ApiError::bad_request("License code and email are required"));
    };

    let license = state
        .stores
        .licenses
        .find_by_code(&normalize_code(&code))
        .await?
        .filter(|l| l.email == normalize_email(&email) && l.is_active)
        .ok_or_else(|| ApiError::not_found("License not found or inactive"))?;

    replace_addons(state, license.id, &req.add_ons).await?;

    tracing::info!(license = %license.id, addons = ?req.add_ons, "add-ons updated");
    Ok(Json(json!({ "success": true, "message": "Add-ons updated" })))
}

/// Admin: list any license's active add-ons.
pub async fn admin_get_addons(
    state: &AppState,
    ctx: &RequestContext,
    req: LicenseIdRequest,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;
    let license_id = req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    let addons = state.stores.addons.active_for_license(license_id).await?;
    Ok(Json(json!({ "success": true, "addons": to_value(&addons)? })))
}

/// Admin: replace any license's active add-on set.
pub async fn admin_update_addons(
    state: &AppState,
    ctx: &RequestContext,
    req: AdminAddonsRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id = req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    replace_addons(state, license_id, &req.add_ons).await?;

    state
        .audit()
        .record(
            &actor.email,
            "update_addons",
            Some(license_id),
            json!({ "addOns": req.add_ons }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true, "message": "Add-ons updated" })))
}

/// Deactivate everything, then re-activate the selected set. Reuses rows on
/// the (license, addon) key so toggling never accumulates duplicates.
async fn replace_addons(
    state: &AppState,
    license_id: uuid::Uuid,
    add_ons: &[String],
) -> Result<(), ApiError> {
    let now = state.clock.now();
    state.stores.addons.deactivate_all(license_id, now).await?;
    for addon_id in add_ons {
        state.stores.addons.activate(license_id, addon_id, now).await?;
    }
    Ok(())
}
