use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::models::{DeviceClass, NewAuditLogEntry, NewLoginHistoryEntry};
use crate::database::store::{AuditLogStore, LoginHistoryStore};

const USER_AGENT_MAX: usize = 500;

/// Best-effort audit appender. A failed write is logged and swallowed; it
/// never blocks the privileged action it describes.
pub struct AuditRecorder {
    store: Arc<dyn AuditLogStore>,
    clock: Arc<dyn Clock>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditLogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn record(
        &self,
        actor_email: &str,
        action: &str,
        target_id: Option<Uuid>,
        details: Value,
        ip_address: &str,
    ) {
        let entry = NewAuditLogEntry {
            actor_email: actor_email.to_string(),
            action: action.to_string(),
            target_id,
            details,
            ip_address: ip_address.to_string(),
        };
        if let Err(e) = self.store.append(entry, self.clock.now()).await {
            tracing::error!(action, "failed to write audit entry: {}", e);
        }
    }
}

/// Best-effort login history appender for full validations.
pub struct LoginRecorder {
    store: Arc<dyn LoginHistoryStore>,
    clock: Arc<dyn Clock>,
}

impl LoginRecorder {
    pub fn new(store: Arc<dyn LoginHistoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn record(&self, license_id: Uuid, ip_address: &str, user_agent: &str, success: bool) {
        let agent: String = user_agent.chars().take(USER_AGENT_MAX).collect();

        let entry = NewLoginHistoryEntry {
            license_id,
            ip_address: ip_address.to_string(),
            user_agent: agent,
            device_class: DeviceClass::from_user_agent(user_agent),
            success,
        };
        if let Err(e) = self.store.append(entry, self.clock.now()).await {
            tracing::error!(license = %license_id, "failed to write login history: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::database::store::Stores;

    #[tokio::test]
    async fn login_recorder_truncates_and_classifies() {
        let stores = Stores::memory();
        let recorder = LoginRecorder::new(stores.logins.clone(), Arc::new(SystemClock));
        let license_id = Uuid::new_v4();

        let long_agent = format!("Mobile {}", "x".repeat(600));
        recorder.record(license_id, "1.2.3.4", &long_agent, true).await;

        let history = stores.logins.list_for_license(license_id, 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_agent.chars().count(), USER_AGENT_MAX);
        assert_eq!(history[0].device_class, DeviceClass::Mobile);
    }
}
