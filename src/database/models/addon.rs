use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An optional paid add-on attached to a license. `(license_id, addon_id)` is
/// unique; toggling reuses the row rather than inserting duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LicenseAddon {
    pub id: Uuid,
    pub license_id: Uuid,
    pub addon_id: String,
    pub addon_name: String,
    pub is_active: bool,
    pub activated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}
