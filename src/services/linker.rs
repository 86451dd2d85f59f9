use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::models::{License, MemberRole, NewMembership};
use crate::database::store::{MembershipStore, StoreError, StoreResult};

/// What the linker did for this validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The identity already had a membership on this license.
    AlreadyLinked,
    /// A pre-invited row was claimed by attaching the identity.
    Attached,
    /// A brand-new membership was inserted.
    Created(MemberRole),
}

/// Idempotently binds an authenticated identity to a company membership.
///
/// The identity-to-membership binding is permanent: a row that already
/// carries an identity is never re-linked, which closes the account-hijack
/// window where a second login could steal an invited seat.
pub struct MembershipLinker {
    memberships: Arc<dyn MembershipStore>,
    clock: Arc<dyn Clock>,
}

impl MembershipLinker {
    pub fn new(memberships: Arc<dyn MembershipStore>, clock: Arc<dyn Clock>) -> Self {
        Self { memberships, clock }
    }

    pub async fn link(
        &self,
        license: &License,
        email: &str,
        identity_id: Uuid,
    ) -> StoreResult<LinkOutcome> {
        let now = self.clock.now();

        if self.memberships.find_by_identity(license.id, identity_id).await?.is_some() {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        if let Some(existing) = self.memberships.find_by_email(license.id, email).await? {
            if existing.identity_id.is_some() {
                // Linked to some other identity; the binding stands.
                tracing::info!(
                    membership = %existing.id,
                    "membership already linked, refusing re-link for {}",
                    email
                );
                return Ok(LinkOutcome::AlreadyLinked);
            }
            // Single conditional update; a concurrent first login for the
            // same invited email loses the race cleanly.
            if self.memberships.attach_identity(existing.id, identity_id, now).await? {
                tracing::info!(membership = %existing.id, "linked identity to invited membership");
                return Ok(LinkOutcome::Attached);
            }
            return Ok(LinkOutcome::AlreadyLinked);
        }

        // No row at all: first sight of this email on this license.
        let is_owner_email = license.email == email;
        let role = if is_owner_email && !self.memberships.owner_exists(license.id).await? {
            MemberRole::Owner
        } else {
            MemberRole::Member
        };
        let display_name = if is_owner_email {
            let name = [license.first_name.as_deref(), license.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if name.is_empty() {
                None
            } else {
                Some(name)
            }
        } else {
            None
        };

        let inserted = self
            .memberships
            .insert(NewMembership {
                license_id: license.id,
                email: email.to_string(),
                identity_id: Some(identity_id),
                role,
                display_name,
                invited_at: None,
                accepted_at: Some(now),
            })
            .await;

        match inserted {
            Ok(_) => Ok(LinkOutcome::Created(role)),
            // A concurrent validation inserted the row first; fall back to
            // claiming it.
            Err(StoreError::Conflict(_)) => {
                if let Some(existing) = self.memberships.find_by_email(license.id, email).await? {
                    if existing.identity_id.is_none()
                        && self.memberships.attach_identity(existing.id, identity_id, now).await?
                    {
                        return Ok(LinkOutcome::Attached);
                    }
                }
                Ok(LinkOutcome::AlreadyLinked)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::database::models::{License, NewLicense, PlanTier};
    use crate::database::store::Stores;

    async fn seed() -> (Stores, License, MembershipLinker) {
        let stores = Stores::memory();
        let license = stores
            .licenses
            .insert(NewLicense {
                license_code: "AAAA-BBBB-CCCC-DDDD".to_string(),
                email: "owner@acme.test".to_string(),
                plan_tier: PlanTier::Start,
                first_name: Some("Ada".to_string()),
                last_name: Some("Acme".to_string()),
                company_name: None,
                registration_id: None,
                address: None,
                city: None,
                postal_code: None,
                company_status: None,
                employee_count: None,
            })
            .await
            .unwrap();
        let linker = MembershipLinker::new(stores.memberships.clone(), Arc::new(SystemClock));
        (stores, license, linker)
    }

    #[tokio::test]
    async fn owner_first_login_creates_owner_row() {
        let (stores, license, linker) = seed().await;
        let identity = Uuid::new_v4();

        let outcome = linker.link(&license, "owner@acme.test", identity).await.unwrap();
        assert_eq!(outcome, LinkOutcome::Created(MemberRole::Owner));

        let row = stores
            .memberships
            .find_by_email(license.id, "owner@acme.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.identity_id, Some(identity));
        assert_eq!(row.display_name.as_deref(), Some("Ada Acme"));
    }

    #[tokio::test]
    async fn linking_twice_is_idempotent() {
        let (stores, license, linker) = seed().await;
        let identity = Uuid::new_v4();

        linker.link(&license, "owner@acme.test", identity).await.unwrap();
        let second = linker.link(&license, "owner@acme.test", identity).await.unwrap();
        assert_eq!(second, LinkOutcome::AlreadyLinked);
        assert_eq!(stores.memberships.count_for_license(license.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invited_member_claims_existing_row() {
        let (stores, license, linker) = seed().await;
        let invited = stores
            .memberships
            .insert(NewMembership {
                license_id: license.id,
                email: "user2@acme.test".to_string(),
                identity_id: None,
                role: MemberRole::Member,
                display_name: None,
                invited_at: Some(chrono::Utc::now()),
                accepted_at: None,
            })
            .await
            .unwrap();

        let identity = Uuid::new_v4();
        let outcome = linker.link(&license, "user2@acme.test", identity).await.unwrap();
        assert_eq!(outcome, LinkOutcome::Attached);

        let row =
            stores.memberships.find_by_email(license.id, "user2@acme.test").await.unwrap().unwrap();
        assert_eq!(row.id, invited.id, "no duplicate row created");
        assert_eq!(row.identity_id, Some(identity));
        assert_eq!(stores.memberships.count_for_license(license.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn linked_row_is_never_reassigned() {
        let (stores, license, linker) = seed().await;
        let first = Uuid::new_v4();
        linker.link(&license, "user2@acme.test", first).await.unwrap();

        // A different identity presenting the same email must not steal it.
        let second = Uuid::new_v4();
        let outcome = linker.link(&license, "user2@acme.test", second).await.unwrap();
        assert_eq!(outcome, LinkOutcome::AlreadyLinked);

        let row =
            stores.memberships.find_by_email(license.id, "user2@acme.test").await.unwrap().unwrap();
        assert_eq!(row.identity_id, Some(first));
    }

    #[tokio::test]
    async fn second_email_becomes_member_when_owner_exists() {
        let (_, license, linker) = seed().await;
        linker.link(&license, "owner@acme.test", Uuid::new_v4()).await.unwrap();

        let outcome = linker.link(&license, "user2@acme.test", Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, LinkOutcome::Created(MemberRole::Member));
    }
}
