//! Store trait definitions for the persistence seam.
//!
//! All operations are async and row-scoped. The two contention points -
//! the rate-limit counter and the membership identity attach - are modeled
//! as single conditional updates so backends can make them atomic instead
//! of read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::models::{
    AuditLogEntry, BusinessRecord, BusinessTable, FeatureOverrideSet, License, LicenseAddon,
    LicensePatch, LoginHistoryEntry, Membership, NewAuditLogEntry, NewLicense,
    NewLoginHistoryEntry, NewMembership, PlanTier, RateLimitCounter, ResourceLimits, UsageTotals,
    UserFeatureOverride, VisibilityFlags,
};

/// Errors surfaced by any store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait LicenseStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<License>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<License>>;
    /// All licenses, newest first.
    async fn list_all(&self) -> StoreResult<Vec<License>>;
    /// Licenses carrying a non-empty registration id, ordered by it.
    async fn list_registered(&self) -> StoreResult<Vec<License>>;
    async fn code_exists(&self, code: &str) -> StoreResult<bool>;
    async fn insert(&self, new: NewLicense) -> StoreResult<License>;
    /// Apply a partial update. Returns false when the row does not exist.
    async fn apply_patch(&self, id: Uuid, patch: LicensePatch) -> StoreResult<bool>;
    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<bool>;
    async fn set_plan(&self, id: Uuid, plan: PlanTier) -> StoreResult<bool>;
    async fn set_limits(&self, id: Uuid, limits: ResourceLimits) -> StoreResult<bool>;
    async fn set_visibility(&self, id: Uuid, flags: VisibilityFlags) -> StoreResult<bool>;
    /// Stamp first activation (only if unset) and last use.
    async fn mark_activated(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    async fn touch_last_used(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    /// Soft-deactivate a merged-away license, keeping it resolvable by code.
    async fn deactivate_with_note(&self, id: Uuid, note: &str) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_by_email(&self, license_id: Uuid, email: &str)
        -> StoreResult<Option<Membership>>;
    async fn find_by_identity(
        &self,
        license_id: Uuid,
        identity_id: Uuid,
    ) -> StoreResult<Option<Membership>>;
    async fn owner_exists(&self, license_id: Uuid) -> StoreResult<bool>;
    /// Members ordered owner-first, then by creation time.
    async fn list_for_license(&self, license_id: Uuid) -> StoreResult<Vec<Membership>>;
    async fn list_active_for_license(&self, license_id: Uuid) -> StoreResult<Vec<Membership>>;
    async fn count_for_license(&self, license_id: Uuid) -> StoreResult<i64>;
    async fn insert(&self, new: NewMembership) -> StoreResult<Membership>;
    async fn set_active(&self, membership_id: Uuid, active: bool) -> StoreResult<bool>;
    /// Attach an identity to a not-yet-linked row. Single conditional update
    /// (`WHERE identity_id IS NULL`); returns false when the row was already
    /// linked or missing.
    async fn attach_identity(
        &self,
        membership_id: Uuid,
        identity_id: Uuid,
        accepted_at: DateTime<Utc>,
    ) -> StoreResult<bool>;
    /// Move memberships from one license to another, skipping emails already
    /// present on the target. Returns the number of rows moved.
    async fn reassign_license(&self, source: Uuid, target: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn tenant_flags(&self, license_id: Uuid) -> StoreResult<Option<FeatureOverrideSet>>;
    /// Merge the given flags into the license's single override row,
    /// creating it when absent.
    async fn upsert_tenant_flags(
        &self,
        license_id: Uuid,
        flags: BTreeMap<String, bool>,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn user_overrides(&self, membership_id: Uuid)
        -> StoreResult<Vec<UserFeatureOverride>>;
    async fn set_user_override(
        &self,
        membership_id: Uuid,
        feature_key: &str,
        enabled: bool,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait AddonStore: Send + Sync {
    async fn active_for_license(&self, license_id: Uuid) -> StoreResult<Vec<LicenseAddon>>;
    async fn deactivate_all(&self, license_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    /// Upsert on (license_id, addon_id) and mark active.
    async fn activate(
        &self,
        license_id: Uuid,
        addon_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn find(
        &self,
        identifier: &str,
        action_type: &str,
    ) -> StoreResult<Option<RateLimitCounter>>;
    async fn create(
        &self,
        identifier: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Reset a counter whose window has elapsed back to attempts=1.
    async fn reset(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    async fn lock(&self, id: Uuid, until: DateTime<Utc>) -> StoreResult<()>;
    /// Atomic increment at the storage layer. Returns the new attempt count.
    async fn increment(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<i32>;
    /// Drop a counter entirely (successful admin login resets its throttle).
    async fn remove(&self, identifier: &str, action_type: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, entry: NewAuditLogEntry, now: DateTime<Utc>) -> StoreResult<()>;
    /// Newest first.
    async fn list_for_target(&self, target_id: Uuid, limit: i64)
        -> StoreResult<Vec<AuditLogEntry>>;
}

#[async_trait]
pub trait LoginHistoryStore: Send + Sync {
    async fn append(&self, entry: NewLoginHistoryEntry, now: DateTime<Utc>) -> StoreResult<()>;
    /// Newest first.
    async fn list_for_license(
        &self,
        license_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<LoginHistoryEntry>>;
}

#[async_trait]
pub trait BusinessStore: Send + Sync {
    async fn insert(&self, table: BusinessTable, record: BusinessRecord) -> StoreResult<()>;
    /// Move every row of `table` from one license to another. Returns the
    /// number of rows moved.
    async fn reassign_license(
        &self,
        table: BusinessTable,
        source: Uuid,
        target: Uuid,
    ) -> StoreResult<u64>;
    async fn count_by_license(&self, table: BusinessTable, license_id: Uuid) -> StoreResult<i64>;
    async fn count_by_identity(&self, table: BusinessTable, identity_id: Uuid)
        -> StoreResult<i64>;
    async fn totals_by_license(
        &self,
        table: BusinessTable,
        license_id: Uuid,
    ) -> StoreResult<UsageTotals>;
    async fn totals_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<UsageTotals>;
    /// Rows owned by one identity, name-ordered.
    async fn list_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<Vec<BusinessRecord>>;
}

/// Progress markers for the merge saga: which steps of a given merge have
/// completed, so a re-run skips them.
#[async_trait]
pub trait MergeJournalStore: Send + Sync {
    async fn completed_steps(&self, merge_key: &str) -> StoreResult<Vec<String>>;
    async fn record_step(
        &self,
        merge_key: &str,
        step: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// The full set of per-entity stores a request handler works against.
#[derive(Clone)]
pub struct Stores {
    pub licenses: Arc<dyn LicenseStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub features: Arc<dyn FeatureStore>,
    pub addons: Arc<dyn AddonStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub audit: Arc<dyn AuditLogStore>,
    pub logins: Arc<dyn LoginHistoryStore>,
    pub business: Arc<dyn BusinessStore>,
    pub merges: Arc<dyn MergeJournalStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(super::postgres::PgStore::new(pool));
        Self {
            licenses: store.clone(),
            memberships: store.clone(),
            features: store.clone(),
            addons: store.clone(),
            rate_limits: store.clone(),
            audit: store.clone(),
            logins: store.clone(),
            business: store.clone(),
            merges: store,
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(super::memory::MemoryStore::new());
        Self {
            licenses: store.clone(),
            memberships: store.clone(),
            features: store.clone(),
            addons: store.clone(),
            rate_limits: store.clone(),
            audit: store.clone(),
            logins: store.clone(),
            business: store.clone(),
            merges: store,
        }
    }
}
