use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

/// Errors from pool construction and health checks.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Builds and health-checks the service's connection pool.
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect to the configured database URL.
    pub async fn connect(database_url: Option<&str>) -> Result<PgPool, DatabaseError> {
        let raw = database_url.ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        // Validate the URL shape up front so a typo fails with a clear error
        // instead of a connect timeout.
        let parsed = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }

        let pool = PgPoolOptions::new().max_connections(10).connect(raw).await?;
        info!("created database pool for {}", parsed.host_str().unwrap_or("localhost"));
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity.
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}
