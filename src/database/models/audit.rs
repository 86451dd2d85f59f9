use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only record of a privileged mutation. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_email: String,
    pub action: String,
    pub target_id: Option<Uuid>,
    pub details: Value,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLogEntry {
    pub actor_email: String,
    pub action: String,
    pub target_id: Option<Uuid>,
    pub details: Value,
    pub ip_address: String,
}
