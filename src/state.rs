use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StoreBackend};
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::store::Stores;
use crate::identity::memory::MemoryIdentityProvider;
use crate::identity::sql::SqlIdentityProvider;
use crate::identity::{IdentityProvider, SessionSigner};
use crate::services::bootstrap::SessionBootstrapper;
use crate::services::company_data::CompanyDataService;
use crate::services::linker::MembershipLinker;
use crate::services::merge::MergeEngine;
use crate::services::rate_limiter::RateLimiter;
use crate::services::recorders::{AuditRecorder, LoginRecorder};
use crate::services::resolver::LicenseResolver;

/// Per-request dependencies. Handlers are stateless; everything they
/// coordinate through lives behind these seams.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub stores: Stores,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: SessionSigner,
    pub clock: Arc<dyn Clock>,
    /// Present only on the Postgres backend; drives the health endpoint.
    pub pool: Option<sqlx::PgPool>,
}

impl AppState {
    /// Build state for the configured backend.
    pub async fn from_config(config: AppConfig) -> Result<Self, DatabaseError> {
        match config.store.backend {
            StoreBackend::Memory => Ok(Self::memory(config)),
            StoreBackend::Postgres => {
                let pool = DatabaseManager::connect(config.store.database_url.as_deref()).await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                Ok(Self::postgres(config, pool))
            }
        }
    }

    pub fn postgres(config: AppConfig, pool: sqlx::PgPool) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sessions = SessionSigner::new(
            config.security.session_secret.clone(),
            config.security.session_ttl_secs,
        );
        let identity: Arc<dyn IdentityProvider> = Arc::new(SqlIdentityProvider::new(
            pool.clone(),
            sessions.clone(),
            clock.clone(),
        ));
        Self {
            stores: Stores::postgres(pool.clone()),
            identity,
            sessions,
            clock,
            pool: Some(pool),
            config,
        }
    }

    pub fn memory(config: AppConfig) -> Self {
        Self::memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn memory_with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionSigner::new(
            config.security.session_secret.clone(),
            config.security.session_ttl_secs,
        );
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(MemoryIdentityProvider::new(sessions.clone(), clock.clone()));
        Self { stores: Stores::memory(), identity, sessions, clock, pool: None, config }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.stores.rate_limits.clone(), self.clock.clone(), &self.config.rate_limit)
    }

    pub fn resolver(&self) -> LicenseResolver {
        LicenseResolver::new(self.stores.licenses.clone(), self.stores.memberships.clone())
    }

    pub fn bootstrapper(&self) -> SessionBootstrapper {
        SessionBootstrapper::new(self.identity.clone())
    }

    pub fn linker(&self) -> MembershipLinker {
        MembershipLinker::new(self.stores.memberships.clone(), self.clock.clone())
    }

    pub fn merge_engine(&self) -> MergeEngine {
        MergeEngine::new(self.stores.clone(), self.clock.clone())
    }

    pub fn audit(&self) -> AuditRecorder {
        AuditRecorder::new(self.stores.audit.clone(), self.clock.clone())
    }

    pub fn login_recorder(&self) -> LoginRecorder {
        LoginRecorder::new(self.stores.logins.clone(), self.clock.clone())
    }

    pub fn company_data(&self) -> CompanyDataService {
        CompanyDataService::new(self.stores.clone())
    }
}
