use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;

use super::{
    hash_credential, AuthSession, Identity, IdentityError, IdentityProvider, NewIdentity,
    SessionSigner,
};

#[derive(Debug, FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    password_hash: String,
    email_confirmed: bool,
    metadata: Value,
    created_at: DateTime<Utc>,
    last_sign_in_at: Option<DateTime<Utc>>,
}

impl IdentityRow {
    fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
            email_confirmed: self.email_confirmed,
            metadata: self.metadata,
            created_at: self.created_at,
            last_sign_in_at: self.last_sign_in_at,
        }
    }
}

/// Identity provider backed by the `auth_identities` table.
pub struct SqlIdentityProvider {
    pool: PgPool,
    signer: SessionSigner,
    clock: Arc<dyn Clock>,
}

impl SqlIdentityProvider {
    pub fn new(pool: PgPool, signer: SessionSigner, clock: Arc<dyn Clock>) -> Self {
        Self { pool, signer, clock }
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<IdentityRow>, IdentityError> {
        sqlx::query_as::<_, IdentityRow>("SELECT * FROM auth_identities WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for SqlIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let row = self.fetch_by_email(email).await?.ok_or(IdentityError::InvalidCredentials)?;
        if row.password_hash != hash_credential(password) {
            return Err(IdentityError::InvalidCredentials);
        }

        let now = self.clock.now();
        sqlx::query("UPDATE auth_identities SET last_sign_in_at = $2 WHERE id = $1")
            .bind(row.id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        self.signer.issue(&row.into_identity(), now)
    }

    async fn create_identity(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "INSERT INTO auth_identities (email, password_hash, email_confirmed, metadata) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&new.email)
        .bind(hash_credential(&new.password))
        .bind(new.email_confirmed)
        .bind(&new.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                IdentityError::AlreadyExists(new.email.clone())
            }
            _ => IdentityError::Provider(e.to_string()),
        })?;

        Ok(row.into_identity())
    }

    async fn update_password(&self, id: Uuid, password: &str) -> Result<(), IdentityError> {
        let result = sqlx::query("UPDATE auth_identities SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash_credential(password))
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_metadata(&self, id: Uuid, metadata: Value) -> Result<(), IdentityError> {
        let result = sqlx::query("UPDATE auth_identities SET metadata = $2 WHERE id = $1")
            .bind(id)
            .bind(&metadata)
            .execute(&self.pool)
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(IdentityError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.fetch_by_email(email).await?.map(IdentityRow::into_identity))
    }
}
