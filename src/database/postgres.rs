//! Postgres store backend. Runtime-checked sqlx queries; the conditional
//! updates (identity attach, rate-limit increment) execute as single
//! statements so per-row atomicity comes from the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, QueryBuilder};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::models::{
    AuditLogEntry, BusinessRecord, BusinessTable, FeatureOverrideSet, License, LicenseAddon,
    LicensePatch, LoginHistoryEntry, Membership, NewAuditLogEntry, NewLicense,
    NewLoginHistoryEntry, NewMembership, PlanTier, RateLimitCounter, ResourceLimits, UsageTotals,
    UserFeatureOverride, VisibilityFlags,
};
use super::store::{
    AddonStore, AuditLogStore, BusinessStore, FeatureStore, LicenseStore, LoginHistoryStore,
    MembershipStore, MergeJournalStore, RateLimitStore, StoreResult,
};

const LICENSE_COLUMNS: &str = "id, license_code, email, is_active, plan_tier, first_name, \
     last_name, company_name, registration_id, address, city, postal_code, company_status, \
     employee_count, max_drivers, max_clients, max_daily_charges, max_monthly_charges, \
     max_yearly_charges, max_users, show_user_info, show_company_info, show_address_info, \
     show_license_info, notes, addons_monthly_total, activated_at, last_used_at, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LicenseStore for PgStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<License>> {
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE license_code = $1");
        Ok(sqlx::query_as::<_, License>(&sql).bind(code).fetch_optional(&self.pool).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<License>> {
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = $1");
        Ok(sqlx::query_as::<_, License>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_all(&self) -> StoreResult<Vec<License>> {
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, License>(&sql).fetch_all(&self.pool).await?)
    }

    async fn list_registered(&self) -> StoreResult<Vec<License>> {
        let sql = format!(
            "SELECT {LICENSE_COLUMNS} FROM licenses \
             WHERE registration_id IS NOT NULL AND registration_id <> '' \
             ORDER BY registration_id, created_at"
        );
        Ok(sqlx::query_as::<_, License>(&sql).fetch_all(&self.pool).await?)
    }

    async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM licenses WHERE license_code = $1")
                .bind(code)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn insert(&self, new: NewLicense) -> StoreResult<License> {
        let sql = format!(
            "INSERT INTO licenses (license_code, email, plan_tier, first_name, last_name, \
             company_name, registration_id, address, city, postal_code, company_status, \
             employee_count, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE) \
             RETURNING {LICENSE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, License>(&sql)
            .bind(&new.license_code)
            .bind(&new.email)
            .bind(new.plan_tier)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.company_name)
            .bind(&new.registration_id)
            .bind(&new.address)
            .bind(&new.city)
            .bind(&new.postal_code)
            .bind(&new.company_status)
            .bind(new.employee_count)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn apply_patch(&self, id: Uuid, patch: LicensePatch) -> StoreResult<bool> {
        if patch.is_empty() {
            return Ok(self.find_by_id(id).await?.is_some());
        }

        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new("UPDATE licenses SET ");
        let mut fields = builder.separated(", ");
        if let Some(email) = &patch.email {
            fields.push("email = ").push_bind_unseparated(email.clone());
        }
        if let Some(plan) = patch.plan_tier {
            fields.push("plan_tier = ").push_bind_unseparated(plan);
        }
        if let Some(v) = &patch.first_name {
            fields.push("first_name = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.last_name {
            fields.push("last_name = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.company_name {
            fields.push("company_name = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.registration_id {
            fields.push("registration_id = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.address {
            fields.push("address = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.city {
            fields.push("city = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.postal_code {
            fields.push("postal_code = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.company_status {
            fields.push("company_status = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = patch.employee_count {
            fields.push("employee_count = ").push_bind_unseparated(v);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE licenses SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_plan(&self, id: Uuid, plan: PlanTier) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE licenses SET plan_tier = $2 WHERE id = $1")
            .bind(id)
            .bind(plan)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_limits(&self, id: Uuid, limits: ResourceLimits) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE licenses SET max_drivers = $2, max_clients = $3, max_daily_charges = $4, \
             max_monthly_charges = $5, max_yearly_charges = $6, max_users = $7 WHERE id = $1",
        )
        .bind(id)
        .bind(limits.max_drivers)
        .bind(limits.max_clients)
        .bind(limits.max_daily_charges)
        .bind(limits.max_monthly_charges)
        .bind(limits.max_yearly_charges)
        .bind(limits.max_users)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_visibility(&self, id: Uuid, flags: VisibilityFlags) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE licenses SET show_user_info = $2, show_company_info = $3, \
             show_address_info = $4, show_license_info = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(flags.show_user_info)
        .bind(flags.show_company_info)
        .bind(flags.show_address_info)
        .bind(flags.show_license_info)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_activated(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE licenses SET activated_at = COALESCE(activated_at, $2), last_used_at = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE licenses SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_with_note(&self, id: Uuid, note: &str) -> StoreResult<()> {
        sqlx::query("UPDATE licenses SET is_active = FALSE, notes = $2 WHERE id = $1")
            .bind(id)
            .bind(note)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM licenses WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn find_by_email(
        &self,
        license_id: Uuid,
        email: &str,
    ) -> StoreResult<Option<Membership>> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM company_memberships WHERE license_id = $1 AND email = $2",
        )
        .bind(license_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_by_identity(
        &self,
        license_id: Uuid,
        identity_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM company_memberships WHERE license_id = $1 AND identity_id = $2",
        )
        .bind(license_id)
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn owner_exists(&self, license_id: Uuid) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM company_memberships WHERE license_id = $1 AND role = 'owner'",
        )
        .bind(license_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn list_for_license(&self, license_id: Uuid) -> StoreResult<Vec<Membership>> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM company_memberships WHERE license_id = $1 \
             ORDER BY role, created_at",
        )
        .bind(license_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_active_for_license(&self, license_id: Uuid) -> StoreResult<Vec<Membership>> {
        Ok(sqlx::query_as::<_, Membership>(
            "SELECT * FROM company_memberships WHERE license_id = $1 AND is_active \
             ORDER BY role, created_at",
        )
        .bind(license_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_for_license(&self, license_id: Uuid) -> StoreResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM company_memberships WHERE license_id = $1")
            .bind(license_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn insert(&self, new: NewMembership) -> StoreResult<Membership> {
        Ok(sqlx::query_as::<_, Membership>(
            "INSERT INTO company_memberships \
             (license_id, email, identity_id, role, display_name, invited_at, accepted_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) \
             RETURNING *",
        )
        .bind(new.license_id)
        .bind(&new.email)
        .bind(new.identity_id)
        .bind(new.role)
        .bind(&new.display_name)
        .bind(new.invited_at)
        .bind(new.accepted_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_active(&self, membership_id: Uuid, active: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE company_memberships SET is_active = $2 WHERE id = $1")
            .bind(membership_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn attach_identity(
        &self,
        membership_id: Uuid,
        identity_id: Uuid,
        accepted_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE company_memberships SET identity_id = $2, accepted_at = $3 \
             WHERE id = $1 AND identity_id IS NULL",
        )
        .bind(membership_id)
        .bind(identity_id)
        .bind(accepted_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reassign_license(&self, source: Uuid, target: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE company_memberships m SET license_id = $2 \
             WHERE m.license_id = $1 AND NOT EXISTS \
               (SELECT 1 FROM company_memberships t WHERE t.license_id = $2 AND t.email = m.email)",
        )
        .bind(source)
        .bind(target)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FeatureStore for PgStore {
    async fn tenant_flags(&self, license_id: Uuid) -> StoreResult<Option<FeatureOverrideSet>> {
        Ok(sqlx::query_as::<_, FeatureOverrideSet>(
            "SELECT * FROM license_features WHERE license_id = $1",
        )
        .bind(license_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert_tenant_flags(
        &self,
        license_id: Uuid,
        flags: BTreeMap<String, bool>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO license_features (license_id, flags, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (license_id) DO UPDATE \
             SET flags = license_features.flags || EXCLUDED.flags, updated_at = EXCLUDED.updated_at",
        )
        .bind(license_id)
        .bind(Json(flags))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_overrides(&self, membership_id: Uuid) -> StoreResult<Vec<UserFeatureOverride>> {
        Ok(sqlx::query_as::<_, UserFeatureOverride>(
            "SELECT membership_id, feature_key, enabled FROM user_feature_overrides \
             WHERE membership_id = $1 ORDER BY feature_key",
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_user_override(
        &self,
        membership_id: Uuid,
        feature_key: &str,
        enabled: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO user_feature_overrides (membership_id, feature_key, enabled) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (membership_id, feature_key) DO UPDATE SET enabled = EXCLUDED.enabled",
        )
        .bind(membership_id)
        .bind(feature_key)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AddonStore for PgStore {
    async fn active_for_license(&self, license_id: Uuid) -> StoreResult<Vec<LicenseAddon>> {
        Ok(sqlx::query_as::<_, LicenseAddon>(
            "SELECT * FROM license_addons WHERE license_id = $1 AND is_active ORDER BY addon_id",
        )
        .bind(license_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn deactivate_all(&self, license_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE license_addons SET is_active = FALSE, deactivated_at = $2 \
             WHERE license_id = $1 AND is_active",
        )
        .bind(license_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activate(
        &self,
        license_id: Uuid,
        addon_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO license_addons \
             (license_id, addon_id, addon_name, is_active, activated_at, deactivated_at) \
             VALUES ($1, $2, $2, TRUE, $3, NULL) \
             ON CONFLICT (license_id, addon_id) DO UPDATE \
             SET is_active = TRUE, activated_at = EXCLUDED.activated_at, deactivated_at = NULL",
        )
        .bind(license_id)
        .bind(addon_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn find(
        &self,
        identifier: &str,
        action_type: &str,
    ) -> StoreResult<Option<RateLimitCounter>> {
        Ok(sqlx::query_as::<_, RateLimitCounter>(
            "SELECT * FROM rate_limits WHERE identifier = $1 AND action_type = $2",
        )
        .bind(identifier)
        .bind(action_type)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create(
        &self,
        identifier: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO rate_limits \
             (identifier, action_type, attempts, first_attempt_at, last_attempt_at) \
             VALUES ($1, $2, 1, $3, $3) \
             ON CONFLICT (identifier, action_type) DO NOTHING",
        )
        .bind(identifier)
        .bind(action_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE rate_limits SET attempts = 1, first_attempt_at = $2, last_attempt_at = $2, \
             locked_until = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lock(&self, id: Uuid, until: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE rate_limits SET locked_until = $2 WHERE id = $1")
            .bind(id)
            .bind(until)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<i32> {
        Ok(sqlx::query_scalar(
            "UPDATE rate_limits SET attempts = attempts + 1, last_attempt_at = $2 \
             WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn remove(&self, identifier: &str, action_type: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM rate_limits WHERE identifier = $1 AND action_type = $2")
            .bind(identifier)
            .bind(action_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditLogStore for PgStore {
    async fn append(&self, entry: NewAuditLogEntry, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO admin_audit_log \
             (actor_email, action, target_id, details, ip_address, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&entry.actor_email)
        .bind(&entry.action)
        .bind(entry.target_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_target(
        &self,
        target_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(sqlx::query_as::<_, AuditLogEntry>(
            "SELECT * FROM admin_audit_log WHERE target_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(target_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl LoginHistoryStore for PgStore {
    async fn append(&self, entry: NewLoginHistoryEntry, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO login_history \
             (license_id, ip_address, user_agent, device_class, success, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.license_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.device_class)
        .bind(entry.success)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_license(
        &self,
        license_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<LoginHistoryEntry>> {
        Ok(sqlx::query_as::<_, LoginHistoryEntry>(
            "SELECT * FROM login_history WHERE license_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(license_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl BusinessStore for PgStore {
    async fn insert(&self, table: BusinessTable, record: BusinessRecord) -> StoreResult<()> {
        // Table names come from the enum, never from input.
        let sql = format!(
            "INSERT INTO {} (id, license_id, identity_id, name, revenue, distance_km, data, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            table.table_name()
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.license_id)
            .bind(record.identity_id)
            .bind(&record.name)
            .bind(record.revenue)
            .bind(record.distance_km)
            .bind(&record.data)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reassign_license(
        &self,
        table: BusinessTable,
        source: Uuid,
        target: Uuid,
    ) -> StoreResult<u64> {
        let sql =
            format!("UPDATE {} SET license_id = $2 WHERE license_id = $1", table.table_name());
        let result = sqlx::query(&sql).bind(source).bind(target).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_by_license(&self, table: BusinessTable, license_id: Uuid) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE license_id = $1", table.table_name());
        Ok(sqlx::query_scalar(&sql).bind(license_id).fetch_one(&self.pool).await?)
    }

    async fn count_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE identity_id = $1", table.table_name());
        Ok(sqlx::query_scalar(&sql).bind(identity_id).fetch_one(&self.pool).await?)
    }

    async fn totals_by_license(
        &self,
        table: BusinessTable,
        license_id: Uuid,
    ) -> StoreResult<UsageTotals> {
        let sql = format!(
            "SELECT COALESCE(SUM(revenue), 0.0), COALESCE(SUM(distance_km), 0.0) \
             FROM {} WHERE license_id = $1",
            table.table_name()
        );
        let (revenue, distance_km): (f64, f64) =
            sqlx::query_as(&sql).bind(license_id).fetch_one(&self.pool).await?;
        Ok(UsageTotals { revenue, distance_km })
    }

    async fn totals_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<UsageTotals> {
        let sql = format!(
            "SELECT COALESCE(SUM(revenue), 0.0), COALESCE(SUM(distance_km), 0.0) \
             FROM {} WHERE identity_id = $1",
            table.table_name()
        );
        let (revenue, distance_km): (f64, f64) =
            sqlx::query_as(&sql).bind(identity_id).fetch_one(&self.pool).await?;
        Ok(UsageTotals { revenue, distance_km })
    }

    async fn list_by_identity(
        &self,
        table: BusinessTable,
        identity_id: Uuid,
    ) -> StoreResult<Vec<BusinessRecord>> {
        let sql =
            format!("SELECT * FROM {} WHERE identity_id = $1 ORDER BY name", table.table_name());
        Ok(sqlx::query_as::<_, BusinessRecord>(&sql)
            .bind(identity_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl MergeJournalStore for PgStore {
    async fn completed_steps(&self, merge_key: &str) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT step FROM merge_journal WHERE merge_key = $1 ORDER BY completed_at",
        )
        .bind(merge_key)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_step(
        &self,
        merge_key: &str,
        step: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO merge_journal (merge_key, step, completed_at) VALUES ($1, $2, $3) \
             ON CONFLICT (merge_key, step) DO NOTHING",
        )
        .bind(merge_key)
        .bind(step)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
