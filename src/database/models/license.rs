use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription plan tier. Stored as the `plan_tier` enum in Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
pub enum PlanTier {
    Start,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Parse a client-supplied tier name. Unknown names are rejected so the
    /// update-plan action can 400 on bad input.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(PlanTier::Start),
            "pro" => Some(PlanTier::Pro),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Start => "start",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

/// A license row: one billable tenant. The code is unique and never
/// reassigned; a merged-away license stays resolvable by its code but
/// inactive.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct License {
    pub id: Uuid,
    pub license_code: String,
    /// Owner email, lowercased.
    pub email: String,
    pub is_active: bool,
    pub plan_tier: PlanTier,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    /// Business registration number; duplicate detection groups on the
    /// whitespace-normalized value.
    pub registration_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub company_status: Option<String>,
    pub employee_count: Option<i32>,
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
    pub notes: Option<String>,
    pub addons_monthly_total: f64,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a fresh license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub license_code: String,
    pub email: String,
    pub plan_tier: PlanTier,
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

/// Partial update for the update-license action. `None` leaves the column
/// unchanged; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct LicensePatch {
    pub email: Option<String>,
    pub plan_tier: Option<PlanTier>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub company_name: Option<Option<String>>,
    pub registration_id: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub company_status: Option<Option<String>>,
    pub employee_count: Option<Option<i32>>,
}

impl LicensePatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.plan_tier.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.company_name.is_none()
            && self.registration_id.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.postal_code.is_none()
            && self.company_status.is_none()
            && self.employee_count.is_none()
    }
}

/// Per-tenant resource limits (update-limits action).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_drivers: Option<i32>,
    pub max_clients: Option<i32>,
    pub max_daily_charges: Option<i32>,
    pub max_monthly_charges: Option<i32>,
    pub max_yearly_charges: Option<i32>,
    pub max_users: Option<i32>,
}

/// Which license/company fields members may see (update-visibility action).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilityFlags {
    pub show_user_info: bool,
    pub show_company_info: bool,
    pub show_address_info: bool,
    pub show_license_info: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_tier_parses_known_names_only() {
        assert_eq!(PlanTier::parse("start"), Some(PlanTier::Start));
        assert_eq!(PlanTier::parse("pro"), Some(PlanTier::Pro));
        assert_eq!(PlanTier::parse("enterprise"), Some(PlanTier::Enterprise));
        assert_eq!(PlanTier::parse("platinum"), None);
        assert_eq!(PlanTier::parse("Pro"), None);
    }
}
