use std::sync::Arc;
use thiserror::Error;

use crate::database::models::{License, MemberRole, Membership};
use crate::database::store::{LicenseStore, MembershipStore, StoreError};
use crate::error::ApiError;

/// Why a (code, email) pair does not grant access. The three terminal kinds
/// are distinguishable so the caller can say exactly what went wrong.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("license code not found")]
    CodeNotFound,

    #[error("email not entitled for this license")]
    NotEntitled,

    #[error("membership is inactive")]
    MembershipInactive,

    #[error("license is inactive")]
    LicenseInactive,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::CodeNotFound => ApiError::not_found("License not found"),
            ResolveError::NotEntitled => ApiError::unauthorized(
                "Email not authorized for this license. Contact your administrator.",
            ),
            ResolveError::MembershipInactive => {
                ApiError::inactive("Account disabled. Contact your administrator.")
            }
            ResolveError::LicenseInactive => ApiError::inactive("License disabled"),
            ResolveError::Store(e) => e.into(),
        }
    }
}

/// How the caller relates to the license.
#[derive(Debug, Clone)]
pub enum Caller {
    Owner,
    Member(Membership),
}

impl Caller {
    pub fn role(&self) -> MemberRole {
        match self {
            Caller::Owner => MemberRole::Owner,
            Caller::Member(m) => m.role,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedLicense {
    pub license: License,
    pub caller: Caller,
}

/// Resolves a tenant by code and the caller's relationship to it.
///
/// Lookup is by code alone, not (code, email): non-owner members authenticate
/// with their own email against the shared company code.
pub struct LicenseResolver {
    licenses: Arc<dyn LicenseStore>,
    memberships: Arc<dyn MembershipStore>,
}

impl LicenseResolver {
    pub fn new(licenses: Arc<dyn LicenseStore>, memberships: Arc<dyn MembershipStore>) -> Self {
        Self { licenses, memberships }
    }

    pub async fn resolve(&self, code: &str, email: &str) -> Result<ResolvedLicense, ResolveError> {
        let license =
            self.licenses.find_by_code(code).await?.ok_or(ResolveError::CodeNotFound)?;

        let caller = if license.email == email {
            Caller::Owner
        } else {
            let membership = self
                .memberships
                .find_by_email(license.id, email)
                .await?
                .ok_or(ResolveError::NotEntitled)?;
            if !membership.is_active {
                return Err(ResolveError::MembershipInactive);
            }
            Caller::Member(membership)
        };

        // An inactive license always fails, owner or not.
        if !license.is_active {
            return Err(ResolveError::LicenseInactive);
        }

        Ok(ResolvedLicense { license, caller })
    }
}

/// License codes are stored uppercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Emails are stored lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
