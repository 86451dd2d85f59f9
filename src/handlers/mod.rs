//! Single-endpoint action dispatch.
//!
//! Every request is a JSON body whose `action` field selects an operation.
//! The actions form a tagged union deserialized up front and matched
//! exhaustively, so an unhandled variant is a compile error rather than a
//! fall-through branch.

pub mod addons;
pub mod admin;
pub mod admin_login;
pub mod sync;
pub mod validate;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::auth::{authorize_admin, AdminActor, AdminAuthContext};
use crate::error::ApiError;
use crate::state::AppState;

/// Everything a handler needs from the transport layer: caller network
/// identity plus whatever credential material was presented.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: String,
    pub user_agent: String,
    pub auth: AdminAuthContext,
    /// Bearer token as presented; doubles as the end-user session token on
    /// the validate/check paths.
    pub session_token: Option<String>,
}

impl RequestContext {
    pub fn from_parts(headers: &HeaderMap, body: &Value) -> Self {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);

        let auth = AdminAuthContext {
            bearer_token: bearer.clone(),
            body_token: body.get("adminToken").and_then(Value::as_str).map(str::to_string),
            legacy_email: body.get("adminEmail").and_then(Value::as_str).map(str::to_string),
        };

        Self {
            client_ip: client_ip(headers),
            user_agent: headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            auth,
            session_token: bearer,
        }
    }
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub license_code: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEmailRequest {
    pub license_code: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddonsRequest {
    pub license_code: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub add_ons: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseRequest {
    pub email: Option<String>,
    pub plan_tier: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub registration_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub company_status: Option<String>,
    pub employee_count: Option<i32>,
    /// When set, invite the email into this existing company instead of
    /// minting a new license.
    pub assign_to_company_id: Option<Uuid>,
    pub user_role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseRequest {
    pub license_id: Option<Uuid>,
    pub email: Option<String>,
    pub plan_tier: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub registration_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub company_status: Option<String>,
    pub employee_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseIdRequest {
    pub license_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStatusRequest {
    pub license_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub license_id: Option<Uuid>,
    pub plan_tier: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLimitsRequest {
    pub license_id: Option<Uuid>,
    pub max_drivers: Option<i32>,
    pub max_clients: Option<i32>,
    pub max_daily_charges: Option<i32>,
    pub max_monthly_charges: Option<i32>,
    pub max_yearly_charges: Option<i32>,
    pub max_users: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeaturesRequest {
    pub license_id: Option<Uuid>,
    pub features: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVisibilityRequest {
    pub license_id: Option<Uuid>,
    pub show_user_info: Option<bool>,
    pub show_company_info: Option<bool>,
    pub show_address_info: Option<bool>,
    pub show_license_info: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserFeaturesRequest {
    pub membership_id: Option<Uuid>,
    pub overrides: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCompaniesRequest {
    pub target_license_id: Option<Uuid>,
    pub source_license_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScopeRequest {
    pub license_id: Option<Uuid>,
    pub identity_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserDetailKind {
    Vehicles,
    Drivers,
    Charges,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetailsRequest {
    pub license_id: Option<Uuid>,
    pub identity_id: Option<Uuid>,
    pub r#type: Option<UserDetailKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogsRequest {
    pub license_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAddonsRequest {
    pub license_id: Option<Uuid>,
    #[serde(default)]
    pub add_ons: Vec<String>,
}

/// The full action surface, one variant per operation.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Command {
    // End-user actions, gated by (code, email) and rate limiting.
    Validate(ValidateRequest),
    Check(CodeEmailRequest),
    GetAddons(CodeEmailRequest),
    UpdateAddons(UpdateAddonsRequest),
    SyncCompany(CodeEmailRequest),

    // Privileged actions, gated by the authorization resolver.
    ListAll,
    DetectDuplicates,
    MergeCompanies(MergeCompaniesRequest),
    CreateLicense(CreateLicenseRequest),
    UpdateLicense(UpdateLicenseRequest),
    DeleteLicense(LicenseIdRequest),
    ToggleStatus(ToggleStatusRequest),
    UpdatePlan(UpdatePlanRequest),
    UpdateLimits(UpdateLimitsRequest),
    UpdateFeatures(UpdateFeaturesRequest),
    UpdateVisibility(UpdateVisibilityRequest),
    UpdateUserFeatures(UpdateUserFeaturesRequest),
    GetCompanyData(LicenseIdRequest),
    GetLoginHistory(LicenseIdRequest),
    GetUserStats(UserScopeRequest),
    GetUserDetails(UserDetailsRequest),
    GetAuditLogs(AuditLogsRequest),
    AdminGetAddons(LicenseIdRequest),
    AdminUpdateAddons(AdminAddonsRequest),
}

/// POST / - parse, dispatch, respond. A missing `action` means `validate`,
/// which keeps old activation clients working.
pub async fn action_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    let Some(map) = body.as_object_mut() else {
        return ApiError::bad_request("Request body must be a JSON object").into_response();
    };
    map.entry("action").or_insert_with(|| json!("validate"));

    let ctx = RequestContext::from_parts(&headers, &body);

    let command: Command = match serde_json::from_value(body) {
        Ok(command) => command,
        Err(e) => {
            return ApiError::bad_request(format!("Malformed request: {e}")).into_response();
        }
    };

    match dispatch(&state, &ctx, command).await {
        Ok(body) => body.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn dispatch(
    state: &AppState,
    ctx: &RequestContext,
    command: Command,
) -> Result<Json<Value>, ApiError> {
    match command {
        Command::Validate(req) => validate::validate(state, ctx, req).await,
        Command::Check(req) => validate::check(state, ctx, req).await,
        Command::GetAddons(req) => addons::get_addons(state, req).await,
        Command::UpdateAddons(req) => addons::update_addons(state, req).await,
        Command::SyncCompany(req) => sync::sync_company(state, req).await,

        Command::ListAll => admin::licenses::list_all(state, ctx).await,
        Command::DetectDuplicates => admin::merge::detect_duplicates(state, ctx).await,
        Command::MergeCompanies(req) => admin::merge::merge_companies(state, ctx, req).await,
        Command::CreateLicense(req) => admin::licenses::create_license(state, ctx, req).await,
        Command::UpdateLicense(req) => admin::licenses::update_license(state, ctx, req).await,
        Command::DeleteLicense(req) => admin::licenses::delete_license(state, ctx, req).await,
        Command::ToggleStatus(req) => admin::licenses::toggle_status(state, ctx, req).await,
        Command::UpdatePlan(req) => admin::licenses::update_plan(state, ctx, req).await,
        Command::UpdateLimits(req) => admin::licenses::update_limits(state, ctx, req).await,
        Command::UpdateFeatures(req) => admin::licenses::update_features(state, ctx, req).await,
        Command::UpdateVisibility(req) => {
            admin::licenses::update_visibility(state, ctx, req).await
        }
        Command::UpdateUserFeatures(req) => {
            admin::licenses::update_user_features(state, ctx, req).await
        }
        Command::GetCompanyData(req) => admin::company::get_company_data(state, ctx, req).await,
        Command::GetLoginHistory(req) => admin::company::get_login_history(state, ctx, req).await,
        Command::GetUserStats(req) => admin::company::get_user_stats(state, ctx, req).await,
        Command::GetUserDetails(req) => admin::company::get_user_details(state, ctx, req).await,
        Command::GetAuditLogs(req) => admin::company::get_audit_logs(state, ctx, req).await,
        Command::AdminGetAddons(req) => addons::admin_get_addons(state, ctx, req).await,
        Command::AdminUpdateAddons(req) => addons::admin_update_addons(state, ctx, req).await,
    }
}

/// Resolve the privileged caller or reject. Every admin handler goes through
/// here first.
pub fn require_admin(state: &AppState, ctx: &RequestContext) -> Result<AdminActor, ApiError> {
    authorize_admin(&ctx.auth, &state.config.security)
        .ok_or_else(|| ApiError::unauthorized("Unauthorized access"))
}

/// Serialize a model into a JSON value, mapping the (practically
/// unreachable) failure onto the 500 shape.
pub fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!("response serialization failed: {}", e);
        ApiError::internal("Failed to format response")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_action_defaults_to_validate() {
        let mut body = json!({ "licenseCode": "AAAA", "email": "a@b.test" });
        body.as_object_mut().unwrap().entry("action").or_insert_with(|| json!("validate"));
        let command: Command = serde_json::from_value(body).unwrap();
        assert!(matches!(command, Command::Validate(_)));
    }

    #[test]
    fn kebab_case_actions_parse() {
        let command: Command = serde_json::from_value(json!({
            "action": "merge-companies",
            "targetLicenseId": "6e9c0d3a-55aa-4b9e-9a51-8d2f6a0c1b2d",
            "sourceLicenseIds": ["0b9f49e2-97e4-4b32-a1b3-0ccf00b4d6c5"],
        }))
        .unwrap();
        match command {
            Command::MergeCompanies(req) => {
                assert!(req.target_license_id.is_some());
                assert_eq!(req.source_license_ids.unwrap().len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result: Result<Command, _> =
            serde_json::from_value(json!({ "action": "drop-tables" }));
        assert!(result.is_err());
    }

    use crate::clock::ManualClock;
    use crate::config::{AppConfig, RateLimitConfig, SecurityConfig, StoreBackend, StoreConfig};
    use crate::database::models::{NewLicense, PlanTier};
    use crate::state::AppState;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn test_config() -> AppConfig {
        AppConfig {
            store: StoreConfig { backend: StoreBackend::Memory, database_url: None },
            security: SecurityConfig {
                admin_secret: "dispatch-test-admin".to_string(),
                admin_emails: vec![],
                session_secret: "dispatch-test-session".to_string(),
                session_ttl_secs: 3600,
                admin_token_ttl_secs: 7200,
            },
            rate_limit: RateLimitConfig { max_attempts: 5, window_secs: 900 },
        }
    }

    fn validate_command(code: &str, email: &str) -> Command {
        Command::Validate(ValidateRequest {
            license_code: Some(code.to_string()),
            email: Some(email.to_string()),
        })
    }

    fn ip_ctx(ip: &str) -> RequestContext {
        RequestContext { client_ip: ip.to_string(), ..Default::default() }
    }

    async fn seed_license(state: &AppState, code: &str, email: &str) {
        state
            .stores
            .licenses
            .insert(NewLicense {
                license_code: code.to_string(),
                email: email.to_string(),
                plan_tier: PlanTier::Start,
                first_name: None,
                last_name: None,
                company_name: None,
                registration_id: None,
                address: None,
                city: None,
                postal_code: None,
                company_status: None,
                employee_count: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn validate_throttles_then_recovers_after_window() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
        let state = AppState::memory_with_clock(test_config(), clock.clone());
        let ctx = ip_ctx("203.0.113.5");

        for _ in 0..5 {
            let err = dispatch(&state, &ctx, validate_command("ZZZZ-ZZZZ-ZZZZ-ZZZZ", "a@b.test"))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::NotFound(_)), "pre-lock attempts surface not-found");
        }

        let err = dispatch(&state, &ctx, validate_command("ZZZZ-ZZZZ-ZZZZ-ZZZZ", "a@b.test"))
            .await
            .unwrap_err();
        match err {
            ApiError::RateLimited { retry_after_secs, .. } => {
                assert_eq!(retry_after_secs, 900)
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        // Once the window fully elapses the identifier is usable again.
        clock.advance(Duration::seconds(901));
        let err = dispatch(&state, &ctx, validate_command("ZZZZ-ZZZZ-ZZZZ-ZZZZ", "a@b.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn repeated_validation_keeps_one_membership_and_a_session() {
        let state = AppState::memory(test_config());
        seed_license(&state, "AAAA-BBBB-CCCC-DDDD", "owner@acme.test").await;

        for ip in ["203.0.113.21", "203.0.113.22"] {
            let body = dispatch(
                &state,
                &ip_ctx(ip),
                validate_command("AAAA-BBBB-CCCC-DDDD", "owner@acme.test"),
            )
            .await
            .unwrap();
            assert_eq!(body.0["success"], json!(true));
            assert!(body.0["session"]["access_token"].is_string(), "session issued every time");
        }

        let license = state
            .stores
            .licenses
            .find_by_code("AAAA-BBBB-CCCC-DDDD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.stores.memberships.count_for_license(license.id).await.unwrap(), 1);
        assert!(license.activated_at.is_some());
    }

    #[tokio::test]
    async fn sandbox_codes_bypass_the_throttle() {
        let state = AppState::memory(test_config());
        seed_license(&state, "DEMO-0000-0000-0000", "demo@acme.test").await;
        let ctx = ip_ctx("203.0.113.30");

        // Far more calls than the window allows, all fine.
        for _ in 0..20 {
            let body = dispatch(
                &state,
                &ctx,
                validate_command("DEMO-0000-0000-0000", "demo@acme.test"),
            )
            .await
            .unwrap();
            assert_eq!(body.0["success"], json!(true));
        }
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.8.7.6, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "1.1.1.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "9.8.7.6");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "1.1.1.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "1.1.1.1");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
