use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::{License, PlanTier, UserFeatureOverride};
use crate::error::ApiError;
use crate::services::rate_limiter::{sandbox_credentials, RateDecision, VALIDATE_ACTION};
use crate::services::resolver::{normalize_code, normalize_email, ResolveError};
use crate::state::AppState;

use super::{CodeEmailRequest, RequestContext, ValidateRequest};

/// License fields exposed to the entitled caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub registration_id: Option<String>,
    pub company_status: Option<String>,
    pub employee_count: Option<i32>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub activated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub plan_tier: PlanTier,
    pub max_drivers: Option<i32>,
    pub max_clients: Option<i32>,
    pub max_daily_charges: Option<i32>,
    pub max_monthly_charges: Option<i32>,
    pub max_yearly_charges: Option<i32>,
    pub max_users: Option<i32>,
    pub show_user_info: bool,
    pub show_company_info: bool,
    pub show_address_info: bool,
    pub show_license_info: bool,
}

impl LicensePayload {
    pub fn from_license(license: &License) -> Self {
        Self {
            code: None,
            email: None,
            first_name: license.first_name.clone(),
            last_name: license.last_name.clone(),
            company_name: license.company_name.clone(),
            registration_id: license.registration_id.clone(),
            company_status: license.company_status.clone(),
            employee_count: license.employee_count,
            address: license.address.clone(),
            city: license.city.clone(),
            postal_code: license.postal_code.clone(),
            activated_at: license.activated_at,
            plan_tier: license.plan_tier,
            max_drivers: license.max_drivers,
            max_clients: license.max_clients,
            max_daily_charges: license.max_daily_charges,
            max_monthly_charges: license.max_monthly_charges,
            max_yearly_charges: license.max_yearly_charges,
            max_users: license.max_users,
            show_user_info: license.show_user_info,
            show_company_info: license.show_company_info,
            show_address_info: license.show_address_info,
            show_license_info: license.show_license_info,
        }
    }
}

fn identity_metadata(license: &License) -> Value {
    json!({
        "license_id": license.id,
        "first_name": license.first_name,
        "last_name": license.last_name,
        "company_name": license.company_name,
        "plan_tier": license.plan_tier,
    })
}

/// Full validation: the initial activation path. Rate limited, provisions a
/// session, links the membership, records login history.
pub async fn validate(
    state: &AppState,
    ctx: &RequestContext,
    req: ValidateRequest,
) -> Result<Json<Value>, ApiError> {
    let (Some(code), Some(email)) = (req.license_code, req.email) else {
        return Err(ApiError::bad_request("License code and email are required"));
    };
    let code = normalize_code(&code);
    let email = normalize_email(&email);

    // Sandbox credentials bypass the throttle so shared demo codes cannot
    // lock each other out.
    if !sandbox_credentials(&code, &email) {
        if let RateDecision::Limited { retry_after_secs } =
            state.rate_limiter().check(&ctx.client_ip, VALIDATE_ACTION).await
        {
            tracing::info!(ip = %ctx.client_ip, "validation rate limit exceeded");
            return Err(ApiError::rate_limited(
                "Too many attempts. Try again later.",
                retry_after_secs,
            ));
        }
    }

    let code_prefix: String = code.chars().take(4).collect();
    tracing::info!(code_prefix = %code_prefix, email = %email, "validating license");

    let resolved = state.resolver().resolve(&code, &email).await?;
    tracing::info!(role = ?resolved.caller.role(), email = %email, "license resolved");
    let license = resolved.license;

    let features = state.stores.features.tenant_flags(license.id).await?;

    // Session bootstrap is best-effort; validation succeeds without one.
    let session = state.bootstrapper().bootstrap(&email, &code, identity_metadata(&license)).await;

    let now = state.clock.now();
    state.stores.licenses.mark_activated(license.id, now).await?;

    let mut user_overrides: Vec<UserFeatureOverride> = Vec::new();
    if let Some(session) = &session {
        match state.linker().link(&license, &email, session.user.id).await {
            Ok(outcome) => {
                tracing::debug!(?outcome, "membership link outcome for {}", email)
            }
            Err(e) => tracing::error!("membership link failed for {}: {}", email, e),
        }
        user_overrides = overrides_for_identity(state, license.id, session.user.id).await;
    }

    state.login_recorder().record(license.id, &ctx.client_ip, &ctx.user_agent, true).await;

    let mut payload = LicensePayload::from_license(&license);
    payload.code = Some(code);
    payload.email = Some(email);
    payload.activated_at = license.activated_at.or(Some(now));

    let mut response = json!({
        "success": true,
        "licenseData": super::to_value(&payload)?,
        "customFeatures": features.map(|f| f.flags.0),
        "userFeatureOverrides": if user_overrides.is_empty() { None } else { Some(user_overrides) },
    });
    if let Some(session) = session {
        response["session"] = super::to_value(&session)?;
    }
    Ok(Json(response))
}

/// Lightweight revalidation used on app load. Never rate limited, never
/// bootstraps a session, never writes login history; misses answer
/// `{valid: false}` with 200 so stored credentials can be dropped quietly.
pub async fn check(
    state: &AppState,
    ctx: &RequestContext,
    req: CodeEmailRequest,
) -> Result<Json<Value>, ApiError> {
    let (Some(code), Some(email)) = (req.license_code, req.email) else {
        return Err(ApiError::bad_request("License code and email are required"));
    };
    let code = normalize_code(&code);
    let email = normalize_email(&email);

    let license = match state.resolver().resolve(&code, &email).await {
        Ok(resolved) => resolved.license,
        Err(ResolveError::Store(e)) => return Err(e.into()),
        Err(e) => {
            tracing::debug!("check miss for {}: {}", email, e);
            return Ok(Json(json!({ "valid": false })));
        }
    };

    let features = state.stores.features.tenant_flags(license.id).await?;

    // A presented session token scopes the per-user overrides.
    let mut user_overrides: Vec<UserFeatureOverride> = Vec::new();
    if let Some(claims) = ctx.session_token.as_deref().and_then(|t| state.sessions.verify(t)) {
        user_overrides = overrides_for_identity(state, license.id, claims.sub).await;
    }

    state.stores.licenses.touch_last_used(license.id, state.clock.now()).await?;

    Ok(Json(json!({
        "valid": true,
        "licenseData": super::to_value(&LicensePayload::from_license(&license))?,
        "customFeatures": features.map(|f| f.flags.0),
        "userFeatureOverrides": if user_overrides.is_empty() { None } else { Some(user_overrides) },
    })))
}

/// Per-user overrides, resolved through the caller's membership. Failures
/// are swallowed; overrides are a side channel.
async fn overrides_for_identity(
    state: &AppState,
    license_id: Uuid,
    identity_id: Uuid,
) -> Vec<UserFeatureOverride> {
    let membership = match state.stores.memberships.find_by_identity(license_id, identity_id).await
    {
        Ok(Some(membership)) => membership,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::error!("membership lookup for overrides failed: {}", e);
            return Vec::new();
        }
    };
    match state.stores.features.user_overrides(membership.id).await {
        Ok(overrides) => overrides,
        Err(e) => {
            tracing::error!("user override lookup failed: {}", e);
            Vec::new()
        }
    }
}
