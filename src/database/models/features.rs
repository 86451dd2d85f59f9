use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Tenant-level feature flag overrides. At most one row per license.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeatureOverrideSet {
    pub id: Uuid,
    pub license_id: Uuid,
    pub flags: Json<BTreeMap<String, bool>>,
    pub updated_at: DateTime<Utc>,
}

/// A per-member flag that overrides the tenant default for one feature.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserFeatureOverride {
    pub membership_id: Uuid,
    pub feature_key: String,
    pub enabled: bool,
}
