use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sliding-window attempt counter keyed by (identifier, action_type).
///
/// Attempts outside the configured window are void; a locked counter denies
/// everything until `locked_until` passes, after which it behaves as newly
/// created. Counters are never deleted, only logically expired.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateLimitCounter {
    pub id: Uuid,
    pub identifier: String,
    pub action_type: String,
    pub attempts: i32,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}
