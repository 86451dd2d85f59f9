use axum::Json;
use serde_json::{json, Value};

use crate::database::store::StoreError;
use crate::error::ApiError;
use crate::handlers::{require_admin, to_value, MergeCompaniesRequest, RequestContext};
use crate::state::AppState;

/// Migrate one or more source companies into a target and retire the
/// sources. Exactly one audit entry per merge call.
pub async fn merge_companies(
    state: &AppState,
    ctx: &RequestContext,
    req: MergeCompaniesRequest,
) -> Result<Json<Value>, ApiError> {
    let actor = require_admin(state, ctx)?;

    let target_id = req
        .target_license_id
        .ok_or_else(|| ApiError::bad_request("Target and source license ids required"))?;
    let source_ids = req
        .source_license_ids
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ApiError::bad_request("Target and source license ids required"))?;

    tracing::info!(target = %target_id, sources = ?source_ids, "merging companies");

    let report = state.merge_engine().merge(target_id, &source_ids).await.map_err(|e| match e {
        StoreError::NotFound(what) => ApiError::not_found(format!("Not found: {what}")),
        StoreError::Conflict(what) => ApiError::bad_request(what),
        other => other.into(),
    })?;

    state
        .audit()
        .record(
            &actor.email,
            "merge_companies",
            Some(target_id),
            json!({ "sourceLicenseIds": source_ids }),
            &ctx.client_ip,
        )
        .await;

    Ok(Json(json!({ "success": true, "report": to_value(&report)? })))
}

/// Exact-match duplicate candidates, grouped by whitespace-normalized
/// registration id.
pub async fn detect_duplicates(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Json<Value>, ApiError> {
    require_admin(state, ctx)?;

    let duplicates = state.merge_engine().detect_duplicates().await?;
    Ok(Json(json!({ "success": true, "duplicates": to_value(&duplicates)? })))
}
