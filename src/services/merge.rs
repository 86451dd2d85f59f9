use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::models::{BusinessTable, License};
use crate::database::store::{Stores, StoreError, StoreResult};

/// One source license's migration outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMergeReport {
    pub source_id: Uuid,
    pub moved_memberships: u64,
    pub moved_records: BTreeMap<&'static str, u64>,
    /// Steps skipped because a previous partial run already completed them.
    pub resumed_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub target_id: Uuid,
    pub sources: Vec<SourceMergeReport>,
}

/// A cluster of licenses sharing one business registration id.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub registration_id: String,
    pub licenses: Vec<DuplicateLicense>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateLicense {
    #[serde(flatten)]
    pub license: License,
    pub user_count: i64,
}

/// Migrates memberships and business records from source licenses into a
/// target and deactivates the sources.
///
/// The migration is not atomic across tables. Each merge runs as a saga:
/// every completed step is journaled under a per-source key, so re-invoking
/// the same merge after a partial failure resumes at the first incomplete
/// step instead of redoing (or double-counting) finished ones.
pub struct MergeEngine {
    stores: Stores,
    clock: Arc<dyn Clock>,
}

const STEP_MEMBERSHIPS: &str = "memberships";
const STEP_DEACTIVATE: &str = "deactivate";

impl MergeEngine {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    pub async fn merge(&self, target_id: Uuid, source_ids: &[Uuid]) -> StoreResult<MergeReport> {
        let target = self
            .stores
            .licenses
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("target license {target_id}")))?;

        let mut sources = Vec::with_capacity(source_ids.len());
        for &source_id in source_ids {
            if source_id == target_id {
                return Err(StoreError::Conflict(
                    "cannot merge a license into itself".to_string(),
                ));
            }
            sources.push(self.merge_one(&target, source_id).await?);
        }

        Ok(MergeReport { target_id, sources })
    }

    async fn merge_one(
        &self,
        target: &License,
        source_id: Uuid,
    ) -> StoreResult<SourceMergeReport> {
        self.stores
            .licenses
            .find_by_id(source_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("source license {source_id}")))?;

        let merge_key = format!("{source_id}->{}", target.id);
        let completed = self.stores.merges.completed_steps(&merge_key).await?;

        let mut report = SourceMergeReport {
            source_id,
            moved_memberships: 0,
            moved_records: BTreeMap::new(),
            resumed_steps: Vec::new(),
        };

        if completed.iter().any(|s| s == STEP_MEMBERSHIPS) {
            report.resumed_steps.push(STEP_MEMBERSHIPS.to_string());
        } else {
            report.moved_memberships =
                self.stores.memberships.reassign_license(source_id, target.id).await?;
            self.record_step(&merge_key, STEP_MEMBERSHIPS).await?;
        }

        for table in BusinessTable::ALL {
            let step = table.table_name();
            if completed.iter().any(|s| s == step) {
                report.resumed_steps.push(step.to_string());
                continue;
            }
            let moved = self.stores.business.reassign_license(table, source_id, target.id).await?;
            report.moved_records.insert(step, moved);
            self.record_step(&merge_key, step).await?;
        }

        if completed.iter().any(|s| s == STEP_DEACTIVATE) {
            report.resumed_steps.push(STEP_DEACTIVATE.to_string());
        } else {
            // Keep the source as a resolvable-but-dead alias for its code.
            let note = format!(
                "Merged into {} on {}",
                target.id,
                self.clock.now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            );
            self.stores.licenses.deactivate_with_note(source_id, &note).await?;
            self.record_step(&merge_key, STEP_DEACTIVATE).await?;
        }

        tracing::info!(
            source = %source_id,
            target = %target.id,
            memberships = report.moved_memberships,
            "merge source completed"
        );
        Ok(report)
    }

    async fn record_step(&self, merge_key: &str, step: &str) -> StoreResult<()> {
        self.stores.merges.record_step(merge_key, step, self.clock.now()).await
    }

    /// Group licenses by exact-match registration id, whitespace-normalized.
    /// No fuzzy matching; only groups of two or more are surfaced.
    pub async fn detect_duplicates(&self) -> StoreResult<Vec<DuplicateGroup>> {
        let licenses = self.stores.licenses.list_registered().await?;

        let mut groups: BTreeMap<String, Vec<License>> = BTreeMap::new();
        for license in licenses {
            let Some(registration_id) = license.registration_id.as_deref() else { continue };
            let normalized: String =
                registration_id.chars().filter(|c| !c.is_whitespace()).collect();
            if normalized.is_empty() {
                continue;
            }
            groups.entry(normalized).or_default().push(license);
        }

        let mut duplicates = Vec::new();
        for (registration_id, group) in groups {
            if group.len() < 2 {
                continue;
            }
            let mut licenses = Vec::with_capacity(group.len());
            for license in group {
                let user_count = self.stores.memberships.count_for_license(license.id).await?;
                licenses.push(DuplicateLicense { license, user_count });
            }
            duplicates.push(DuplicateGroup { registration_id, licenses });
        }
        Ok(duplicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::database::models::{
        BusinessRecord, MemberRole, NewLicense, NewMembership, PlanTier,
    };
    use chrono::Utc;
    use serde_json::json;

    async fn license(stores: &Stores, code: &str, email: &str, reg: Option<&str>) -> License {
        stores
            .licenses
            .insert(NewLicense {
                license_code: code.to_string(),
                email: email.to_string(),
                plan_tier: PlanTier::Pro,
                first_name: None,
                last_name: None,
                company_name: None,
                registration_id: reg.map(str::to_string),
                address: None,
                city: None,
                postal_code: None,
                company_status: None,
                employee_count: None,
            })
            .await
            .unwrap()
    }

    async fn member(stores: &Stores, license_id: Uuid, email: &str) {
        stores
            .memberships
            .insert(NewMembership {
                license_id,
                email: email.to_string(),
                identity_id: None,
                role: MemberRole::Member,
                display_name: None,
                invited_at: None,
                accepted_at: None,
            })
            .await
            .unwrap();
    }

    fn record(license_id: Uuid, name: &str) -> BusinessRecord {
        BusinessRecord {
            id: Uuid::new_v4(),
            license_id,
            identity_id: None,
            name: Some(name.to_string()),
            revenue: Some(100.0),
            distance_km: Some(50.0),
            data: json!({}),
            created_at: Utc::now(),
        }
    }

    fn engine(stores: &Stores) -> MergeEngine {
        MergeEngine::new(stores.clone(), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn merge_moves_everything_and_deactivates_source() {
        let stores = Stores::memory();
        let target = license(&stores, "TGTA-TGTA-TGTA-TGTA", "a@acme.test", None).await;
        let source = license(&stores, "SRCB-SRCB-SRCB-SRCB", "b@acme.test", None).await;

        member(&stores, source.id, "driver@acme.test").await;
        stores.business.insert(BusinessTable::Trips, record(source.id, "tour 1")).await.unwrap();
        stores.business.insert(BusinessTable::Clients, record(source.id, "client 1")).await.unwrap();

        let report = engine(&stores).merge(target.id, &[source.id]).await.unwrap();
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].moved_memberships, 1);
        assert_eq!(report.sources[0].moved_records["trips"], 1);

        // Everything previously owned by the source now belongs to the target.
        assert_eq!(
            stores.business.count_by_license(BusinessTable::Trips, target.id).await.unwrap(),
            1
        );
        assert_eq!(
            stores.business.count_by_license(BusinessTable::Trips, source.id).await.unwrap(),
            0
        );
        assert_eq!(stores.memberships.count_for_license(target.id).await.unwrap(), 1);

        // The source stays resolvable by its original code, but dead.
        let merged = stores.licenses.find_by_code("SRCB-SRCB-SRCB-SRCB").await.unwrap().unwrap();
        assert!(!merged.is_active);
        assert!(merged.notes.unwrap().contains(&target.id.to_string()));
    }

    #[tokio::test]
    async fn rerunning_a_merge_skips_completed_steps() {
        let stores = Stores::memory();
        let target = license(&stores, "TGTA-TGTA-TGTA-TGTA", "a@acme.test", None).await;
        let source = license(&stores, "SRCB-SRCB-SRCB-SRCB", "b@acme.test", None).await;
        member(&stores, source.id, "driver@acme.test").await;

        let engine = engine(&stores);
        engine.merge(target.id, &[source.id]).await.unwrap();

        let second = engine.merge(target.id, &[source.id]).await.unwrap();
        assert_eq!(second.sources[0].moved_memberships, 0);
        assert!(second.sources[0].resumed_steps.contains(&"memberships".to_string()));
        assert!(second.sources[0].resumed_steps.contains(&"deactivate".to_string()));
    }

    #[tokio::test]
    async fn conflicting_member_emails_stay_on_source() {
        let stores = Stores::memory();
        let target = license(&stores, "TGTA-TGTA-TGTA-TGTA", "a@acme.test", None).await;
        let source = license(&stores, "SRCB-SRCB-SRCB-SRCB", "b@acme.test", None).await;
        member(&stores, target.id, "shared@acme.test").await;
        member(&stores, source.id, "shared@acme.test").await;
        member(&stores, source.id, "only-source@acme.test").await;

        let report = engine(&stores).merge(target.id, &[source.id]).await.unwrap();
        assert_eq!(report.sources[0].moved_memberships, 1);
        assert_eq!(stores.memberships.count_for_license(target.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn merging_into_itself_is_rejected() {
        let stores = Stores::memory();
        let target = license(&stores, "TGTA-TGTA-TGTA-TGTA", "a@acme.test", None).await;
        assert!(engine(&stores).merge(target.id, &[target.id]).await.is_err());
    }

    #[tokio::test]
    async fn duplicates_group_on_normalized_registration_id() {
        let stores = Stores::memory();
        let a = license(&stores, "AAAA-AAAA-AAAA-AAAA", "a@acme.test", Some("123 456 789")).await;
        let b = license(&stores, "BBBB-BBBB-BBBB-BBBB", "b@acme.test", Some("123456789")).await;
        let _lone =
            license(&stores, "CCCC-CCCC-CCCC-CCCC", "c@acme.test", Some("999999999")).await;

        let groups = engine(&stores).detect_duplicates().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].registration_id, "123456789");
        let ids: Vec<Uuid> = groups[0].licenses.iter().map(|l| l.license.id).collect();
        assert!(ids.contains(&a.id) && ids.contains(&b.id));
    }
}
