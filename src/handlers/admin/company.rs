use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::BusinessTable;
use crate::error::ApiError;
use crate::handlers::{
    require_admin, to_value, AuditLogsRequest, LicenseIdRequest, RequestContext,
    UserDetailsRequest, UserDetailKind, UserScopeRequest,
};
use crate::state::AppState;

const HISTORY_LIMIT: i64 = 50;
const AUDIT_DEFAULT_LIMIT: i64 = 50;

/// Everything the admin company panel shows in one round trip: license info,
/// members, per-member statistics, company totals, and recent logins.
pub async fn get_company_data(
    state: &AppState,
    ctx: &RequestContext,
    req: LicenseIdRequest,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    let license = state.stores.licenses.find_by_id(license_id).await?;
    let members = state.stores.memberships.list_for_license(license_id).await?;

    let company_data = state.company_data();
    let (member_stats, totals, logins) = futures::try_join!(
        company_data.all_member_stats(&members),
        company_data.company_totals(license_id),
        state.stores.logins.list_for_license(license_id, HISTORY_LIMIT),
    )?;

    tracing::debug!(
        license = %license_id,
        members = members.len(),
        logins = logins.len(),
        "company data assembled"
    );

    Ok(Json(json!({
        "success": true,
        "licenseInfo": license.map(|l| to_value(&l)).transpose()?,
        "members": to_value(&members)?,
        "memberStats": to_value(&member_stats)?,
        "companyTotals": to_value(&totals)?,
        "loginHistory": to_value(&logins)?,
    })))
}

pub async fn get_login_history(
    state: &AppState,
    ctx: &RequestContext,
    req: LicenseIdRequest,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    let history = state.stores.logins.list_for_license(license_id, HISTORY_LIMIT).await?;
    Ok(Json(json!({ "success": true, "history": to_value(&history)? })))
}

/// Resolve the identity to query: either given directly, or found through the
/// license owner's email.
async fn resolve_identity(
    state: &AppState,
    license_id: Option<Uuid>,
    identity_id: Option<Uuid>,
) -> Result<Option<Uuid>, ApiError> {
    if identity_id.is_some() {
        return Ok(identity_id);
    }
    let Some(license_id) = license_id else {
        return Ok(None);
    };
    let Some(license) = state.stores.licenses.find_by_id(license_id).await? else {
        return Ok(None);
    };
    let identity = state.identity.find_by_email(&license.email).await.map_err(|e| {
        tracing::error!("identity lookup failed: {}", e);
        ApiError::internal("Identity provider error")
    })?;
    Ok(identity.map(|i| i.id))
}

pub async fn get_user_stats(
    state: &AppState,
    ctx: &RequestContext,
    req: UserScopeRequest,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;
    if req.license_id.is_none() && req.identity_id.is_none() {
        return Err(ApiError::bad_request("License or identity id required"));
    }

    let identity_id = resolve_identity(state, req.license_id, req.identity_id).await?;
    let stats = match identity_id {
        Some(id) => state.company_data().identity_counts(id).await?,
        None => Default::default(),
    };

    Ok(Json(json!({
        "success": true,
        "stats": to_value(&stats)?,
        "identityId": identity_id,
    })))
}

pub async fn get_user_details(
    state: &AppState,
    ctx: &RequestContext,
    req: UserDetailsRequest,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;
    if req.license_id.is_none() && req.identity_id.is_none() {
        return Err(ApiError::bad_request("License or identity id required"));
    }
    let kind = req.r#type.ok_or_else(|| ApiError::bad_request("Detail type required"))?;

    let Some(identity_id) = resolve_identity(state, req.license_id, req.identity_id).await? else {
        return Ok(Json(json!({
            "success": true,
            "data": [],
            "message": "User has never authenticated",
        })));
    };

    let table = match kind {
        UserDetailKind::Vehicles => BusinessTable::Vehicles,
        UserDetailKind::Drivers => BusinessTable::Drivers,
        UserDetailKind::Charges => BusinessTable::Charges,
    };
    let records = state.stores.business.list_by_identity(table, identity_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": to_value(&records)?,
        "identityId": identity_id,
    })))
}

pub async fn get_audit_logs(
    state: &AppState,
    ctx: &RequestContext,
    req: AuditLogsRequest,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;
    let limit = req.limit.unwrap_or(AUDIT_DEFAULT_LIMIT).clamp(1, 500);

    let logs = state.stores.audit.list_for_target(license_id, limit).await?;
    Ok(Json(json!({ "success": true, "logs": to_value(&logs)? })))
}
