use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::clock::Clock;

use super::{
    hash_credential, AuthSession, Identity, IdentityError, IdentityProvider, NewIdentity,
    SessionSigner,
};

struct StoredIdentity {
    identity: Identity,
    password_hash: String,
}

/// In-memory identity provider for tests and the memory deployment mode.
pub struct MemoryIdentityProvider {
    identities: Mutex<HashMap<String, StoredIdentity>>,
    signer: SessionSigner,
    clock: Arc<dyn Clock>,
}

impl MemoryIdentityProvider {
    pub fn new(signer: SessionSigner, clock: Arc<dyn Clock>) -> Self {
        Self { identities: Mutex::new(HashMap::new()), signer, clock }
    }
}

fn lock_poisoned() -> IdentityError {
    IdentityError::Provider("identity lock poisoned".to_string())
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let now = self.clock.now();
        let mut identities = self.identities.lock().map_err(|_| lock_poisoned())?;
        let stored = identities.get_mut(email).ok_or(IdentityError::InvalidCredentials)?;
        if stored.password_hash != hash_credential(password) {
            return Err(IdentityError::InvalidCredentials);
        }
        stored.identity.last_sign_in_at = Some(now);
        self.signer.issue(&stored.identity, now)
    }

    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
        let now = self.clock.now();
        let mut identities = self.identities.lock().map_err(|_| lock_poisoned())?;
        if identities.contains_key(&new.email) {
            return Err(IdentityError::AlreadyExists(new.email));
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            email_confirmed: new.email_confirmed,
            metadata: new.metadata,
            created_at: now,
            last_sign_in_at: None,
        };
        identities.insert(
            new.email,
            StoredIdentity {
                identity: identity.clone(),
                password_hash: hash_credential(&new.password),
            },
        );
        Ok(identity)
    }

    async fn update_password(&self, id: Uuid, password: &str) -> Result<(), IdentityError> {
        let mut identities = self.identities.lock().map_err(|_| lock_poisoned())?;
        let stored = identities
            .values_mut()
            .find(|s| s.identity.id == id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;
        stored.password_hash = hash_credential(password);
        Ok(())
    }

    async fn update_metadata(&self, id: Uuid, metadata: Value) -> Result<(), IdentityError> {
        let mut identities = self.identities.lock().map_err(|_| lock_poisoned())?;
        let stored = identities
            .values_mut()
            .find(|s| s.identity.id == id)
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))?;
        stored.identity.metadata = metadata;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        let identities = self.identities.lock().map_err(|_| lock_poisoned())?;
        Ok(identities.get(email).map(|s| s.identity.clone()))
    }
}
