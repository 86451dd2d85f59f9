use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthSession, Identity, IdentityError, SessionUser};

/// Claims embedded in every end-user session access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity id.
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and verifies session access tokens (HS256) plus opaque refresh
/// tokens. Shared by both identity providers.
#[derive(Clone)]
pub struct SessionSigner {
    secret: String,
    ttl_secs: u64,
}

impl SessionSigner {
    pub fn new(secret: impl Into<String>, ttl_secs: u64) -> Self {
        Self { secret: secret.into(), ttl_secs }
    }

    pub fn issue(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, IdentityError> {
        if self.secret.is_empty() {
            return Err(IdentityError::Provider("session secret not configured".to_string()));
        }

        let expires_at = now.timestamp() + self.ttl_secs as i64;
        let claims = SessionClaims {
            sub: identity.id,
            email: identity.email.clone(),
            exp: expires_at,
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| IdentityError::Provider(format!("session token encode: {e}")))?;

        Ok(AuthSession {
            access_token,
            refresh_token: generate_refresh_token(),
            expires_in: self.ttl_secs,
            expires_at,
            user: SessionUser { id: identity.id, email: identity.email.clone() },
        })
    }

    /// Decode and verify a presented access token. Returns None on any
    /// failure; session tokens are a side channel and never abort a request.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        if self.secret.is_empty() {
            return None;
        }
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .ok()
    }
}

/// Cryptographically random opaque refresh token
/// (32 bytes, base64url, no padding).
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "owner@acme.test".to_string(),
            email_confirmed: true,
            metadata: json!({}),
            created_at: Utc::now(),
            last_sign_in_at: None,
        }
    }

    #[test]
    fn issued_token_round_trips() {
        let signer = SessionSigner::new("test-secret", 3600);
        let identity = identity();
        let session = signer.issue(&identity, Utc::now()).unwrap();

        let claims = signer.verify(&session.access_token).expect("token should verify");
        assert_eq!(claims.sub, identity.id);
        assert_eq!(claims.email, identity.email);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signer = SessionSigner::new("test-secret", 3600);
        let session = signer.issue(&identity(), Utc::now()).unwrap();

        let other = SessionSigner::new("other-secret", 3600);
        assert!(other.verify(&session.access_token).is_none());
    }

    #[test]
    fn empty_secret_fails_closed() {
        let signer = SessionSigner::new("", 3600);
        assert!(signer.issue(&identity(), Utc::now()).is_err());
        assert!(signer.verify("whatever").is_none());
    }

    #[test]
    fn refresh_tokens_are_unique() {
        assert_ne!(generate_refresh_token(), generate_refresh_token());
    }
}
