use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

/// One identity's seat on a license. `(license_id, email)` is unique;
/// `identity_id` stays NULL until the member first authenticates, then is set
/// exactly once and never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub license_id: Uuid,
    pub email: String,
    pub identity_id: Option<Uuid>,
    pub role: MemberRole,
    pub is_active: bool,
    pub display_name: Option<String>,
    pub invited_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMembership {
    pub license_id: Uuid,
    pub email: String,
    pub identity_id: Option<Uuid>,
    pub role: MemberRole,
    pub display_name: Option<String>,
    pub invited_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
}
