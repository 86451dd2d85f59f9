use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a signed administrative credential. Transient: verified
/// on every request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub email: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Verify a compact admin token (HS256). Returns the claims only when the
/// signature checks out, `exp` is in the future, and the role is `admin`.
///
/// Order of operations: segment/signature verification first (constant-time
/// inside the JWT library), then payload decode, then claim checks. Never
/// panics or errors; an unconfigured secret fails closed.
pub fn verify_admin_token(token: &str, secret: &str) -> Option<AdminClaims> {
    if secret.is_empty() {
        tracing::error!("admin secret not configured; rejecting token");
        return None;
    }

    let mut validation = Validation::default();
    validation.set_required_spec_claims(&["exp"]);

    let claims = match decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => data.claims,
        Err(e) => {
            tracing::debug!("admin token rejected: {}", e);
            return None;
        }
    };

    if claims.role != "admin" {
        tracing::debug!("admin token rejected: role {}", claims.role);
        return None;
    }

    Some(claims)
}

/// Issue an admin token the way the admin login endpoint does: role=admin,
/// two hours by default.
pub fn issue_admin_token(
    email: &str,
    ip: Option<&str>,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = AdminClaims {
        email: email.to_string(),
        role: "admin".to_string(),
        ip: ip.map(str::to_string),
        iat: now,
        exp: now + ttl_secs as i64,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
