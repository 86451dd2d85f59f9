use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Coarse device classification derived from the user-agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "device_class", rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    /// Substring match, in precedence order. Anything unrecognized counts as
    /// desktop.
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Mobile") {
            DeviceClass::Mobile
        } else if user_agent.contains("Tablet") {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Append-only record of a full license validation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoginHistoryEntry {
    pub id: Uuid,
    pub license_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub device_class: DeviceClass,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoginHistoryEntry {
    pub license_id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub device_class: DeviceClass,
    pub success: bool,
}
