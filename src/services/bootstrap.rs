use serde_json::Value;
use std::sync::Arc;

use crate::identity::{AuthSession, IdentityError, IdentityProvider, NewIdentity};

/// Lazily provisions an identity whose password is the license code, so a
/// valid (code, email) pair doubles as sign-in credentials with no separate
/// signup step.
///
/// The whole chain is best-effort: a failure at any point yields no session,
/// and the caller still returns license data. Concurrent invocations for the
/// same user converge because a racing create surfaces as AlreadyExists and
/// falls into the password-update path.
pub struct SessionBootstrapper {
    identity: Arc<dyn IdentityProvider>,
}

impl SessionBootstrapper {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    pub async fn bootstrap(&self, email: &str, code: &str, metadata: Value) -> Option<AuthSession> {
        // 1. Existing credentials.
        match self.identity.sign_in(email, code).await {
            Ok(session) => {
                // Keep license context on the identity current.
                if let Err(e) = self.identity.update_metadata(session.user.id, metadata).await {
                    tracing::debug!("metadata refresh failed for {}: {}", email, e);
                }
                return Some(session);
            }
            Err(e) => {
                tracing::debug!("sign-in failed for {}, trying create: {}", email, e);
            }
        }

        // 2. New identity, pre-confirmed; license possession is the proof.
        match self
            .identity
            .create_identity(NewIdentity {
                email: email.to_string(),
                password: code.to_string(),
                email_confirmed: true,
                metadata: metadata.clone(),
            })
            .await
        {
            Ok(_) => match self.identity.sign_in(email, code).await {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!("sign-in after create failed for {}: {}", email, e);
                    None
                }
            },
            // 3. Identity exists with a stale password (the code was rotated
            //    since it was set). Force it to the current code and retry
            //    sign-in once.
            Err(IdentityError::AlreadyExists(_)) => {
                self.rotate_and_retry(email, code, metadata).await
            }
            Err(e) => {
                tracing::warn!("identity create failed for {}: {}", email, e);
                None
            }
        }
    }

    async fn rotate_and_retry(
        &self,
        email: &str,
        code: &str,
        metadata: Value,
    ) -> Option<AuthSession> {
        let existing = match self.identity.find_by_email(email).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::warn!("identity vanished between create and lookup for {}", email);
                return None;
            }
            Err(e) => {
                tracing::warn!("identity lookup failed for {}: {}", email, e);
                return None;
            }
        };

        if let Err(e) = self.identity.update_password(existing.id, code).await {
            tracing::warn!("password update failed for {}: {}", email, e);
            return None;
        }
        if let Err(e) = self.identity.update_metadata(existing.id, metadata).await {
            tracing::debug!("metadata refresh failed for {}: {}", email, e);
        }

        match self.identity.sign_in(email, code).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("sign-in after password update failed for {}: {}", email, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::identity::memory::MemoryIdentityProvider;
    use crate::identity::SessionSigner;
    use serde_json::json;

    fn provider() -> Arc<MemoryIdentityProvider> {
        Arc::new(MemoryIdentityProvider::new(
            SessionSigner::new("bootstrap-test-secret", 3600),
            Arc::new(SystemClock),
        ))
    }

    #[tokio::test]
    async fn first_validation_creates_identity_and_signs_in() {
        let provider = provider();
        let bootstrapper = SessionBootstrapper::new(provider.clone());

        let session = bootstrapper
            .bootstrap("owner@acme.test", "AAAA-BBBB-CCCC-DDDD", json!({"plan": "pro"}))
            .await
            .expect("session");
        assert_eq!(session.user.email, "owner@acme.test");

        let identity = provider.find_by_email("owner@acme.test").await.unwrap().unwrap();
        assert!(identity.email_confirmed);
    }

    #[tokio::test]
    async fn second_validation_reuses_identity() {
        let provider = provider();
        let bootstrapper = SessionBootstrapper::new(provider.clone());

        let first = bootstrapper
            .bootstrap("owner@acme.test", "AAAA-BBBB-CCCC-DDDD", json!({}))
            .await
            .unwrap();
        let second = bootstrapper
            .bootstrap("owner@acme.test", "AAAA-BBBB-CCCC-DDDD", json!({}))
            .await
            .unwrap();
        assert_eq!(first.user.id, second.user.id);
    }

    #[tokio::test]
    async fn rotated_code_updates_password_and_recovers() {
        let provider = provider();
        let bootstrapper = SessionBootstrapper::new(provider.clone());

        bootstrapper.bootstrap("owner@acme.test", "OLD1-OLD1-OLD1-OLD1", json!({})).await.unwrap();

        // The license code changed; old credentials no longer match.
        let session = bootstrapper
            .bootstrap("owner@acme.test", "NEW2-NEW2-NEW2-NEW2", json!({}))
            .await
            .expect("session after rotation");

        // The new code is now the working password.
        assert!(provider.sign_in("owner@acme.test", "NEW2-NEW2-NEW2-NEW2").await.is_ok());
        assert!(provider.sign_in("owner@acme.test", "OLD1-OLD1-OLD1-OLD1").await.is_err());
        assert_eq!(session.user.email, "owner@acme.test");
    }
}
