//! Identity/credential provider collaborator.
//!
//! The validation path lazily provisions an identity whose password is the
//! license code, so there is no separate signup step. The provider seam keeps
//! that logic testable and lets the memory deployment run without Postgres.

pub mod memory;
pub mod session;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use session::{SessionClaims, SessionSigner};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub email_confirmed: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    /// Pre-confirm the address; license possession is the proof.
    pub email_confirmed: bool,
    pub metadata: Value,
}

/// A signed session pair returned to the client alongside license data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub expires_at: i64,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity already exists: {0}")]
    AlreadyExists(String),

    #[error("identity not found: {0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError>;
    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, IdentityError>;
    async fn update_password(&self, id: Uuid, password: &str) -> Result<(), IdentityError>;
    async fn update_metadata(&self, id: Uuid, metadata: Value) -> Result<(), IdentityError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError>;
}

/// Credential hash stored by both providers.
pub(crate) fn hash_credential(password: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
