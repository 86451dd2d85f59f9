use axum::Json;
use futures::future::try_join_all;
use rand::Rng;
use serde_json::{json, Value};

use crate::database::models::{
    LicensePatch, MemberRole, NewLicense, NewMembership, PlanTier, ResourceLimits, VisibilityFlags,
};
use crate::error::ApiError;
use crate::handlers::{
    require_admin, to_value, CreateLicenseRequest, LicenseIdRequest, RequestContext,
    ToggleStatusRequest, UpdateFeaturesRequest, UpdateLicenseRequest, UpdateLimitsRequest,
    UpdatePlanRequest, UpdateUserFeaturesRequest, UpdateVisibilityRequest,
};
use crate::services::resolver::normalize_email;
use crate::state::AppState;

/// All licenses with their feature sets and member counts. The per-license
/// lookups are independent and issued concurrently.
pub async fn list_all(state: &AppState, ctx: &RequestContext) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;

    let licenses = state.stores.licenses.list_all().await?;
    let count = licenses.len();

    let enriched = try_join_all(licenses.into_iter().map(|license| {
        let features = state.stores.features.clone();
        let memberships = state.stores.memberships.clone();
        async move {
            let (flags, user_count) = futures::try_join!(
                features.tenant_flags(license.id),
                memberships.count_for_license(license.id),
            )?;
            Ok::<_, crate::database::store::StoreError>((license, flags, user_count))
        }
    }))
    .await?;

    let mut detailed = Vec::with_capacity(enriched.len());
    for (license, flags, user_count) in enriched {
        let mut value = to_value(&license)?;
        value["features"] = flags.map(|f| json!(f.flags.0)).unwrap_or(Value::Null);
        value["user_count"] = json!(user_count);
        detailed.push(value);
    }

    state
        .audit()
        .record(&actor.email, "list_licenses", None, json!({ "count": count }), &ctx.client_ip)
        .await;

    Ok(Json(json!({ "success": true, "licenses": detailed })))
}

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random XXXX-XXXX-XXXX-XXXX code from the uppercase alphanumeric charset.
fn generate_license_code<R: Rng>(rng: &mut R) -> String {
    let mut segments = Vec::with_capacity(4);
    for _ in 0..4 {
        let segment: String = (0..4)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect();
        segments.push(segment);
    }
    segments.join("-")
}

/// Mint a new license, or - with assignToCompanyId - invite the email into an
/// existing company instead.
pub async fn create_license(
    state: &AppState,
    ctx: &RequestContext,
    req: CreateLicenseRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let email = req.email.ok_or_else(|| ApiError::bad_request("Email required"))?;
    let email = normalize_email(&email);

    if let Some(company_id) = req.assign_to_company_id {
        if state.stores.memberships.find_by_email(company_id, &email).await?.is_some() {
            return Err(ApiError::bad_request("This email is already in the company"));
        }

        let role = match req.user_role.as_deref() {
            Some("owner") => MemberRole::Owner,
            _ => MemberRole::Member,
        };
        let display_name = [req.first_name.as_deref(), req.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        let membership = state
            .stores
            .memberships
            .insert(NewMembership {
                license_id: company_id,
                email: email.clone(),
                identity_id: None,
                role,
                display_name: (!display_name.is_empty()).then_some(display_name),
                invited_at: Some(state.clock.now()),
                accepted_at: None,
            })
            .await?;

        state
            .audit()
            .record(
                &actor.email,
                "add_user_to_company",
                Some(company_id),
                json!({ "email": email, "role": role }),
                &ctx.client_ip,
            )
            .await;

        return Ok(Json(json!({
            "success": true,
            "companyUser": to_value(&membership)?,
            "assignedToCompany": true,
        })));
    }

    let plan_tier = req
        .plan_tier
        .as_deref()
        .and_then(PlanTier::parse)
        .unwrap_or(PlanTier::Start);

    // Draw until the code is unused, at most 10 times.
    let mut code = generate_license_code(&mut rand::thread_rng());
    let mut attempts = 0;
    while attempts < 10 && state.stores.licenses.code_exists(&code).await? {
        code = generate_license_code(&mut rand::thread_rng());
        attempts += 1;
    }

    let license = state
        .stores
        .licenses
        .insert(NewLicense {
            license_code: code.clone(),
            email: email.clone(),
            plan_tier,
            first_name: req.first_name,
            last_name: req.last_name,
            company_name: req.company_name,
            registration_id: req.registration_id,
            address: req.address,
            city: req.city,
            postal_code: req.postal_code,
            company_status: req.company_status,
            employee_count: req.employee_count,
        })
        .await?;

    tracing::info!(code = %code, "license created");

    state
        .audit()
        .record(
            &actor.email,
            "create_license",
            Some(license.id),
            json!({ "email": email, "planTier": plan_tier }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({
        "success": true,
        "licenseCode": code,
        "license": to_value(&license)?,
    })))
}

/// Partial field edit. A provided empty string clears the column.
pub async fn update_license(
    state: &AppState,
    ctx: &RequestContext,
    req: UpdateLicenseRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    let clearable = |value: Option<String>| value.map(|v| (!v.is_empty()).then_some(v));

    let patch = LicensePatch {
        email: req.email.as_deref().map(normalize_email),
        // An unknown tier name is skipped rather than rejected.
        plan_tier: req.plan_tier.as_deref().and_then(PlanTier::parse),
        first_name: clearable(req.first_name),
        last_name: clearable(req.last_name),
        company_name: clearable(req.company_name),
        registration_id: clearable(req.registration_id),
        address: clearable(req.address),
        city: clearable(req.city),
        postal_code: clearable(req.postal_code),
        company_status: clearable(req.company_status),
        employee_count: req.employee_count.map(Some),
    };

    let details = json!({
        "patched": patch_field_names(&patch),
    });

    if !state.stores.licenses.apply_patch(license_id, patch).await? {
        return Err(ApiError::not_found("License not found"));
    }

    state
        .audit()
        .record(&actor.email, "update_license", Some(license_id), details, &ctx.client_ip)
        .await;

    Ok(Json(json!({ "success": true })))
}

fn patch_field_names(patch: &LicensePatch) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if patch.email.is_some() {
        fields.push("email");
    }
    if patch.plan_tier.is_some() {
        fields.push("plan_tier");
    }
    if patch.first_name.is_some() {
        fields.push("first_name");
    }
    if patch.last_name.is_some() {
        fields.push("last_name");
    }
    if patch.company_name.is_some() {
        fields.push("company_name");
    }
    if patch.registration_id.is_some() {
        fields.push("registration_id");
    }
    if patch.address.is_some() {
        fields.push("address");
    }
    if patch.city.is_some() {
        fields.push("city");
    }
    if patch.postal_code.is_some() {
        fields.push("postal_code");
    }
    if patch.company_status.is_some() {
        fields.push("company_status");
    }
    if patch.employee_count.is_some() {
        fields.push("employee_count");
    }
    fields
}

/// Hard delete. The only way a license row ever disappears.
pub async fn delete_license(
    state: &AppState,
    ctx: &RequestContext,
    req: LicenseIdRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    if !state.stores.licenses.delete(license_id).await? {
        return Err(ApiError::not_found("License not found"));
    }

    tracing::info!(license = %license_id, "license deleted");
    state
        .audit()
        .record(&actor.email, "delete_license", Some(license_id), json!({}), &ctx.client_ip)
        .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn toggle_status(
    state: &AppState,
    ctx: &RequestContext,
    req: ToggleStatusRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;
    let is_active =
        req.is_active.ok_or_else(|| ApiError::bad_request("isActive flag required"))?;

    if !state.stores.licenses.set_active(license_id, is_active).await? {
        return Err(ApiError::not_found("License not found"));
    }

    state
        .audit()
        .record(
            &actor.email,
            "toggle_license_status",
            Some(license_id),
            json!({ "isActive": is_active }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn update_plan(
    state: &AppState,
    ctx: &RequestContext,
    req: UpdatePlanRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;
    let plan = req
        .plan_tier
        .as_deref()
        .and_then(PlanTier::parse)
        .ok_or_else(|| ApiError::bad_request("Invalid plan tier"))?;

    if !state.stores.licenses.set_plan(license_id, plan).await? {
        return Err(ApiError::not_found("License not found"));
    }

    state
        .audit()
        .record(
            &actor.email,
            "update_plan",
            Some(license_id),
            json!({ "planTier": plan }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn update_limits(
    state: &AppState,
    ctx: &RequestContext,
    req: UpdateLimitsRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    let limits = ResourceLimits {
        max_drivers: req.max_drivers,
        max_clients: req.max_clients,
        max_daily_charges: req.max_daily_charges,
        max_monthly_charges: req.max_monthly_charges,
        max_yearly_charges: req.max_yearly_charges,
        max_users: req.max_users,
    };

    if !state.stores.licenses.set_limits(license_id, limits).await? {
        return Err(ApiError::not_found("License not found"));
    }

    state
        .audit()
        .record(
            &actor.email,
            "update_limits",
            Some(license_id),
            to_value(&limits)?,
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn update_features(
    state: &AppState,
    ctx: &RequestContext,
    req: UpdateFeaturesRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;
    let features =
        req.features.ok_or_else(|| ApiError::bad_request("Feature flags required"))?;

    state
        .stores
        .features
        .upsert_tenant_flags(license_id, features.clone(), state.clock.now())
        .await?;

    state
        .audit()
        .record(
            &actor.email,
            "update_features",
            Some(license_id),
            json!({ "features": features }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

pub async fn update_visibility(
    state: &AppState,
    ctx: &RequestContext,
    req: UpdateVisibilityRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let license_id =
        req.license_id.ok_or_else(|| ApiError::bad_request("License id required"))?;

    let (Some(show_user_info), Some(show_company_info), Some(show_address_info), Some(show_license_info)) =
        (req.show_user_info, req.show_company_info, req.show_address_info, req.show_license_info)
    else {
        return Err(ApiError::bad_request("All visibility flags are required"));
    };

    let flags =
        VisibilityFlags { show_user_info, show_company_info, show_address_info, show_license_info };

    if !state.stores.licenses.set_visibility(license_id, flags).await? {
        return Err(ApiError::not_found("License not found"));
    }

    state
        .audit()
        .record(
            &actor.email,
            "update_visibility",
            Some(license_id),
            to_value(&flags)?,
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

/// Per-member feature overrides on top of the tenant defaults.
pub async fn update_user_features(
    state: &AppState,
    ctx: &RequestContext,
    req: UpdateUserFeaturesRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;
    let membership_id =
        req.membership_id.ok_or_else(|| ApiError::bad_request("Membership id required"))?;
    let overrides =
        req.overrides.ok_or_else(|| ApiError::bad_request("Feature overrides required"))?;

    for (feature_key, enabled) in &overrides {
        state.stores.features.set_user_override(membership_id, feature_key, *enabled).await?;
    }

    state
        .audit()
        .record(
            &actor.email,
            "update_user_features",
            Some(membership_id),
            json!({ "overrides": overrides }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_have_the_canonical_shape() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let code = generate_license_code(&mut rng);
            assert_eq!(code.len(), 19);
            let segments: Vec<&str> = code.split('-').collect();
            assert_eq!(segments.len(), 4);
            for segment in segments {
                assert_eq!(segment.len(), 4);
                assert!(segment.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            }
        }
    }
}
