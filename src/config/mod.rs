use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration, loaded once at startup and carried in the
/// request state. Nothing in here is read from the environment after load,
/// so tests can construct it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Server-held secret for admin token HMAC. Empty means unconfigured;
    /// verification fails closed.
    pub admin_secret: String,
    /// Legacy admin allow-list, lowercased.
    pub admin_emails: Vec<String>,
    /// Secret for end-user session access tokens.
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub admin_token_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("STORE_BACKEND") {
            self.store.backend = match v.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                _ => StoreBackend::Postgres,
            };
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.store.database_url = Some(v);
        }

        if let Ok(v) = env::var("ADMIN_SECRET_CODE") {
            // Trim to avoid newline/space mismatches across deployments
            self.security.admin_secret = v.trim().to_string();
        }
        if let Ok(v) = env::var("ADMIN_EMAILS") {
            self.security.admin_emails = parse_email_list(&v);
        }
        if let Ok(v) = env::var("SESSION_JWT_SECRET") {
            self.security.session_secret = v.trim().to_string();
        }
        if let Ok(v) = env::var("SESSION_TTL_SECS") {
            self.security.session_ttl_secs = v.parse().unwrap_or(self.security.session_ttl_secs);
        }
        if let Ok(v) = env::var("ADMIN_TOKEN_TTL_SECS") {
            self.security.admin_token_ttl_secs =
                v.parse().unwrap_or(self.security.admin_token_ttl_secs);
        }

        if let Ok(v) = env::var("RATE_LIMIT_MAX_ATTEMPTS") {
            self.rate_limit.max_attempts = v.parse().unwrap_or(self.rate_limit.max_attempts);
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = v.parse().unwrap_or(self.rate_limit.window_secs);
        }

        self
    }

    fn defaults() -> Self {
        Self {
            store: StoreConfig { backend: StoreBackend::Postgres, database_url: None },
            security: SecurityConfig {
                admin_secret: String::new(),
                admin_emails: Vec::new(),
                session_secret: String::new(),
                session_ttl_secs: 3600,
                admin_token_ttl_secs: 2 * 3600,
            },
            // 5 validation attempts per 15 minutes per identifier
            rate_limit: RateLimitConfig { max_attempts: 5, window_secs: 900 },
        }
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_validation_policy() {
        let config = AppConfig::defaults();
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert_eq!(config.rate_limit.window_secs, 900);
        assert!(config.security.admin_secret.is_empty());
    }

    #[test]
    fn email_list_is_normalized() {
        let emails = parse_email_list(" Admin@Acme.test , ops@acme.test ,, ");
        assert_eq!(emails, vec!["admin@acme.test".to_string(), "ops@acme.test".to_string()]);
    }
}
