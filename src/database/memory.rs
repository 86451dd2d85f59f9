//! In-memory store backend.
//!
//! Backs the test suites and the `STORE_BACKEND=memory` deployment mode used
//! for demo/sandbox instances. Every trait method takes the single process
//! lock, so the conditional updates are atomic the same way the Postgres
//! statements are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use uuid::Uuid;

use super::models::{
    AuditLogEntry, BusinessRecord, BusinessTable, FeatureOverrideSet, License, LicenseAddon,
    LicensePatch, LoginHistoryEntry, MemberRole, Membership, NewAuditLogEntry, NewLicense,
    NewLoginHistoryEntry, NewMembership, PlanTier, RateLimitCounter, ResourceLimits, UsageTotals,
    UserFeatureOverride, VisibilityFlags,
};
use super::store::{
    AddonStore, AuditLogStore, BusinessStore, FeatureStore, LicenseStore, LoginHistoryStore,
    MembershipStore, MergeJournalStore, RateLimitStore, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    licenses: Vec<License>,
    memberships: Vec<Membership>,
    features: Vec<FeatureOverrideSet>,
    user_overrides: Vec<UserFeatureOverride>,
    addons: Vec<LicenseAddon>,
    rate_limits: Vec<RateLimitCounter>,
    audit: Vec<AuditLogEntry>,
    logins: Vec<LoginHistoryEntry>,
    business: HashMap<BusinessTable, Vec<BusinessRecord>>,
    merge_steps: Vec<(String, String, DateTime<Utc>)>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_poisoned() -> StoreError {
    StoreError::Conflict("store lock poisoned".to_string())
}

#[async_trait]
impl LicenseStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<License>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.licenses.iter().find(|l| l.license_code == code).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<License>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.licenses.iter().find(|l| l.id == id).cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<License>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut all = inner.licenses.clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_registered(&self) -> StoreResult<Vec<License>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut out: Vec<License> = inner
            .licenses
            .iter()
            .filter(|l| l.registration_id.as_deref().is_some_and(|r| !r.is_empty()))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.registration_id.clone(), a.created_at).cmp(&(b.registration_id.clone(), b.created_at))
        });
        Ok(out)
    }

    async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.licenses.iter().any(|l| l.license_code == code))
    }

    async fn insert(&self, new: NewLicense) -> StoreResult<License> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if inner.licenses.iter().any(|l| l.license_code == new.license_code) {
            return Err(StoreError::Conflict(format!("license code {}", new.license_code)));
        }
        let license = License {
            id: Uuid::new_v4(),
            license_code: new.license_code,
            email: new.email,
            is_active: true,
            plan_tier: new.plan_tier,
            first_name: new.first_name,
            last_name: new.last_name,
            company_name: new.company_name,
            registration_id: new.registration_id,
            address: new.address,
            city: new.city,
            postal_code: new.postal_code,
            company_status: new.company_status,
            employee_count: new.employee_count,
            max_drivers: None,
            max_clients: None,
            max_daily_charges: None,
            max_monthly_charges: None,
            max_yearly_charges: None,
            max_users: None,
            show_user_info: true,
            show_company_info: true,
            show_address_info: true,
            show_license_info: true,
            notes: None,
            addons_monthly_total: 0.0,
            activated_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        inner.licenses.push(license.clone());
        Ok(license)
    }

    async fn apply_patch(&self, id: Uuid, patch: LicensePatch) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let Some(license) = inner.licenses.iter_mut().find(|l| l.id == id) else {
            return Ok(false);
        };
        if let Some(email) = patch.email {
            license.email = email;
        }
        if let Some(plan) = patch.plan_tier {
            license.plan_tier = plan;
        }
        if let Some(v) = patch.first_name {
            license.first_name = v;
        }
        if let Some(v) = patch.last_name {
            license.last_name = v;
        }
        if let Some(v) = patch.company_name {
            license.company_name = v;
        }
        if let Some(v) = patch.registration_id {
            license.registration_id = v;
        }
        if let Some(v) = patch.address {
            license.address = v;
        }
        if let Some(v) = patch.city {
            license.city = v;
        }
        if let Some(v) = patch.postal_code {
            license.postal_code = v;
        }
        if let Some(v) = patch.company_status {
            license.company_status = v;
        }
        if let Some(v) = patch.employee_count {
            license.employee_count = v;
        }
        Ok(true)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.licenses.iter_mut().find(|l| l.id == id).map(|l| l.is_active = active).is_some())
    }

    async fn set_plan(&self, id: Uuid, plan: PlanTier) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.licenses.iter_mut().find(|l| l.id == id).map(|l| l.plan_tier = plan).is_some())
    }

    async fn set_limits(&self, id: Uuid, limits: ResourceLimits) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let Some(license) = inner.licenses.iter_mut().find(|l| l.id == id) else {
            return Ok(false);
        };
        license.max_drivers = limits.max_drivers;
        license.max_clients = limits.max_clients;
        license.max_daily_charges = limits.max_daily_charges;
        license.max_monthly_charges = limits.max_monthly_charges;
        license.max_yearly_charges = limits.max_yearly_charges;
        license.max_users = limits.max_users;
        Ok(true)
    }

    async fn set_visibility(&self, id: Uuid, flags: VisibilityFlags) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let Some(license) = inner.licenses.iter_mut().find(|l| l.id == id) else {
            return Ok(false);
        };
        license.show_user_info = flags.show_user_info;
        license.show_company_info = flags.show_company_info;
        license.show_address_info = flags.show_address_info;
        license.show_license_info = flags.show_license_info;
        Ok(true)
    }

    async fn mark_activated(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(license) = inner.licenses.iter_mut().find(|l| l.id == id) {
            license.activated_at.get_or_insert(now);
            license.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(license) = inner.licenses.iter_mut().find(|l| l.id == id) {
            license.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn deactivate_with_note(&self, id: Uuid, note: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(license) = inner.licenses.iter_mut().find(|l| l.id == id) {
            license.is_active = false;
            license.notes = Some(note.to_string());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let before = inner.licenses.len();
        inner.licenses.retain(|l| l.id != id);
        Ok(inner.licenses.len() < before)
    }
}

fn sort_members(members: &mut [Membership]) {
    members.sort_by_key(|m| (m.role != MemberRole::Owner, m.created_at));
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_by_email(
        &self,
        license_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<Membership>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .memberships
            .iter()
            .find(|m| m.license_id == license_id && m.email == email)
            .cloned())
    }

    async fn find_by_identity(
        &self,
        license_id: Uuid,
        identity_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .memberships
            .iter()
            .find(|m| m.license_id == license_id && m.identity_id == Some(identity_id))
            .cloned())
    }

    async fn owner_exists(&self, license_id: Uuid) -> StoreResult<bool> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .memberships
            .iter()
            .any(|m| m.license_id == license_id && m.role == MemberRole::Owner))
    }

    async fn list_for_license(&self, license_id: Uuid) -> StoreResult<Vec<Membership>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut members: Vec<Membership> =
            inner.memberships.iter().filter(|m| m.license_id == license_id).cloned().collect();
        sort_members(&mut members);
        Ok(members)
    }

    async fn list_active_for_license(&self, license_id: Uuid) -> StoreResult<Vec<Membership>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut members: Vec<Membership> = inner
            .memberships
            .iter()
            .filter(|m| m.license_id == license_id && m.is_active)
            .cloned()
            .collect();
        sort_members(&mut members);
        Ok(members)
    }

    async fn count_for_license(&self, license_id: Uuid) -> StoreResult<i64> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.memberships.iter().filter(|m| m.license_id == license_id).count() as i64)
    }

    async fn insert(&self, new: NewMembership) -> StoreResult<Membership> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if inner
            .memberships
            .iter()
            .any(|m| m.license_id == new.license_id && m.email == new.email)
        {
            return Err(StoreError::Conflict(format!("membership {}", new.email)));
        }
        let membership = Membership {
            id: Uuid::new_v4(),
            license_id: new.license_id,
            email: new.email,
            identity_id: new.identity_id,
            role: new.role,
            is_active: true,
            display_name: new.display_name,
            invited_at: new.invited_at,
            accepted_at: new.accepted_at,
            last_activity_at: None,
            created_at: Utc::now(),
        };
        inner.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn set_active(&self, membership_id: Uuid, active: bool) -> StoreResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .memberships
            .iter_mut()
            .find(|m| m.id == membership_id)
            .map(|m| m.is_active = active)
            .is_some())
    }

    async fn attach_identity(
        &self,
        membership_id: Uuid,
        identity_id: Uuid,
        accepted_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        // Single critical section stands in for the conditional UPDATE.
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let Some(membership) = inner.memberships.iter_mut().find(|m| m.id == membership_id) else {
            return Ok(false);
        };
        if membership.identity_id.is_some() {
            return Ok(false);
        }
        membership.identity_id = Some(identity_id);
        membership.accepted_at = Some(accepted_at);
        Ok(true)
    }

    async fn reassign_license(&self, source: Uuid, target: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let taken: Vec<String> = inner
            .memberships
            .iter()
            .filter(|m| m.license_id == target)
            .map(|m| m.email.clone())
            .collect();
        let mut moved = 0;
        for membership in inner.memberships.iter_mut() {
            if membership.license_id == source && !taken.contains(&membership.email) {
                membership.license_id = target;
                moved += 1;
            }
        }
        Ok(moved)
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn tenant_flags(&self, license_id: Uuid) -> StoreResult<Option<FeatureOverrideSet>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner.features.iter().find(|f| f.license_id == license_id).cloned())
    }

    async fn upsert_tenant_flags(
        &self,
        license_id: Uuid,
        flags: BTreeMap<String, bool>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(existing) = inner.features.iter_mut().find(|f| f.license_id == license_id) {
            existing.flags.0.extend(flags);
            existing.updated_at = now;
        } else {
            inner.features.push(FeatureOverrideSet {
                id: Uuid::new_v4(),
                license_id,
                flags: Json(flags),
                updated_at: now,
            });
        }
        Ok(())
    }

    async fn user_overrides(&self, membership_id: Uuid) -> StoreResult<Vec<UserFeatureOverride>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut overrides: Vec<UserFeatureOverride> = inner
            .user_overrides
            .iter()
            .filter(|o| o.membership_id == membership_id)
            .cloned()
            .collect();
        overrides.sort_by(|a, b| a.feature_key.cmp(&b.feature_key));
        Ok(overrides)
    }

    async fn set_user_override(
        &self,
        membership_id: Uuid,
        feature_key: &str,
        enabled: bool,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(existing) = inner
            .user_overrides
            .iter_mut()
            .find(|o| o.membership_id == membership_id && o.feature_key == feature_key)
        {
            existing.enabled = enabled;
        } else {
            inner.user_overrides.push(UserFeatureOverride {
                membership_id,
                feature_key: feature_key.to_string(),
                enabled,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AddonStore for MemoryStore {
    async fn active_for_license(&self, license_id: Uuid) -> StoreResult<Vec<LicenseAddon>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut addons: Vec<LicenseAddon> = inner
            .addons
            .iter()
            .filter(|a| a.license_id == license_id && a.is_active)
            .cloned()
            .collect();
        addons.sort_by(|a, b| a.addon_id.cmp(&b.addon_id));
        Ok(addons)
    }

    async fn deactivate_all(&self, license_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        for addon in inner.addons.iter_mut() {
            if addon.license_id == license_id && addon.is_active {
                addon.is_active = false;
                addon.deactivated_at = Some(now);
            }
        }
        Ok(())
    }

    async fn activate(
        &self,
        license_id: Uuid,
        addon_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(existing) = inner
            .addons
            .iter_mut()
            .find(|a| a.license_id == license_id && a.addon_id == addon_id)
        {
            existing.is_active = true;
            existing.activated_at = now;
            existing.deactivated_at = None;
        } else {
            inner.addons.push(LicenseAddon {
                id: Uuid::new_v4(),
                license_id,
                addon_id: addon_id.to_string(),
                addon_name: addon_id.to_string(),
                is_active: true,
                activated_at: now,
                deactivated_at: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn find(
        &self,
        identifier: &str,
        action_type: &str,
    ) -> StoreResult<Option<RateLimitCounter>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .rate_limits
            .iter()
            .find(|r| r.identifier == identifier && r.action_type == action_type)
            .cloned())
    }

    async fn create(
        &self,
        identifier: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if inner
            .rate_limits
            .iter()
            .any(|r| r.identifier == identifier && r.action_type == action_type)
        {
            return Ok(());
        }
        inner.rate_limits.push(RateLimitCounter {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            action_type: action_type.to_string(),
            attempts: 1,
            first_attempt_at: now,
            last_attempt_at: now,
            locked_until: None,
        });
        Ok(())
    }

    async fn reset(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(counter) = inner.rate_limits.iter_mut().find(|r| r.id == id) {
            counter.attempts = 1;
            counter.first_attempt_at = now;
            counter.last_attempt_at = now;
            counter.locked_until = None;
        }
        Ok(())
    }

    async fn lock(&self, id: Uuid, until: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if let Some(counter) = inner.rate_limits.iter_mut().find(|r| r.id == id) {
            counter.locked_until = Some(until);
        }
        Ok(())
    }

    async fn increment(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<i32> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let counter = inner
            .rate_limits
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("rate limit {id}")))?;
        counter.attempts += 1;
        counter.last_attempt_at = now;
        Ok(counter.attempts)
    }

    async fn remove(&self, identifier: &str, action_type: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        inner.rate_limits.retain(|r| !(r.identifier == identifier && r.action_type == action_type));
        Ok(())
    }
}

#[async_trait]
impl AuditLogStore for MemoryStore {
    async fn append(&self, entry: NewAuditLogEntry, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        inner.audit.push(AuditLogEntry {
            id: Uuid::new_v4(),
            actor_email: entry.actor_email,
            action: entry.action,
            target_id: entry.target_id,
            details: entry.details,
            ip_address: entry.ip_address,
            created_at: now,
        });
        Ok(())
    }

    async fn list_for_target(
        &self,
        target_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut entries: Vec<AuditLogEntry> =
            inner.audit.iter().filter(|e| e.target_id == Some(target_id)).cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[async_trait]
impl LoginHistoryStore for MemoryStore {
    async fn append(&self, entry: NewLoginHistoryEntry, now: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        inner.logins.push(LoginHistoryEntry {
            id: Uuid::new_v4(),
            license_id: entry.license_id,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            device_class: entry.device_class,
            success: entry.success,
            created_at: now,
        });
        Ok(())
    }

    async fn list_for_license(
        &self,
        license_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<LoginHistoryEntry>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut entries: Vec<LoginHistoryEntry> =
            inner.logins.iter().filter(|e| e.license_id == license_id).cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[async_trait]
impl BusinessStore for MemoryStore {
    async fn insert(&self, table: BusinessTable, record: BusinessRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        inner.business.entry(table).or_default().push(record);
        Ok(())
    }

    async fn reassign_license(
        &self,
        table: BusinessTable,
        source: Uuid,
        target: Uuid,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut moved = 0;
        for record in inner.business.entry(table).or_default().iter_mut() {
            if record.license_id == source {
                record.license_id = target;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn count_by_license(&self, table: BusinessTable, license_id: Uuid) -> StoreResult<i64> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .business
            .get(&table)
            .map(|rows| rows.iter().filter(|r| r.license_id == license_id).count())
            .unwrap_or(0) as i64)
    }

    async fn count_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<i64> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        Ok(inner
            .business
            .get(&table)
            .map(|rows| rows.iter().filter(|r| r.identity_id == Some(identity_id)).count())
            .unwrap_or(0) as i64)
    }

    async fn totals_by_license(
        &self,
        table: BusinessTable,
        license_id: Uuid,
    ) -> StoreResult<UsageTotals> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut totals = UsageTotals::default();
        if let Some(rows) = inner.business.get(&table) {
            for record in rows.iter().filter(|r| r.license_id == license_id) {
                totals.revenue += record.revenue.unwrap_or(0.0);
                totals.distance_km += record.distance_km.unwrap_or(0.0);
            }
        }
        Ok(totals)
    }

    async fn totals_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<UsageTotals> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut totals = UsageTotals::default();
        if let Some(rows) = inner.business.get(&table) {
            for record in rows.iter().filter(|r| r.identity_id == Some(identity_id)) {
                totals.revenue += record.revenue.unwrap_or(0.0);
                totals.distance_km += record.distance_km.unwrap_or(0.0);
            }
        }
        Ok(totals)
    }

    async fn list_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<Vec<BusinessRecord>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut rows: Vec<BusinessRecord> = inner
            .business
            .get(&table)
            .map(|rows| {
                rows.iter().filter(|r| r.identity_id == Some(identity_id)).cloned().collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

#[async_trait]
impl MergeJournalStore for MemoryStore {
    async fn completed_steps(&self, merge_key: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        let mut steps: Vec<(String, DateTime<Utc>)> = inner
            .merge_steps
            .iter()
            .filter(|(key, _, _)| key == merge_key)
            .map(|(_, step, at)| (step.clone(), *at))
            .collect();
        steps.sort_by_key(|(_, at)| *at);
        Ok(steps.into_iter().map(|(step, _)| step).collect())
    }

    async fn record_step(
        &self,
        merge_key: &str,
        step: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().map_err(|_| lock_poisoned())?;
        if !inner.merge_steps.iter().any(|(key, s, _)| key == merge_key && s == step) {
            inner.merge_steps.push((merge_key.to_string(), step.to_string(), now));
        }
        Ok(())
    }
}
