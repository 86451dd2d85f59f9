use crate::config::SecurityConfig;

use super::token::verify_admin_token;

/// The trust mechanisms accepted for privileged actions, in priority order.
/// The legacy email list exists to bridge clients that predate signed
/// tokens; it is logged loudly whenever it resolves an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    BearerHeader,
    BodyToken,
    LegacyEmailList,
}

impl AuthStrategy {
    pub const PRIORITY: [AuthStrategy; 3] =
        [AuthStrategy::BearerHeader, AuthStrategy::BodyToken, AuthStrategy::LegacyEmailList];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategy::BearerHeader => "bearer_header",
            AuthStrategy::BodyToken => "body_token",
            AuthStrategy::LegacyEmailList => "legacy_email_list",
        }
    }
}

/// The resolved privileged caller and which strategy vouched for them.
#[derive(Debug, Clone)]
pub struct AdminActor {
    pub email: String,
    pub strategy: AuthStrategy,
}

/// Credential material collected from a request before command dispatch.
#[derive(Debug, Clone, Default)]
pub struct AdminAuthContext {
    /// Token from an `Authorization: Bearer ...` header.
    pub bearer_token: Option<String>,
    /// Token embedded in the request body (`adminToken`).
    pub body_token: Option<String>,
    /// Plain email asserted in the request body (`adminEmail`).
    pub legacy_email: Option<String>,
}

/// Resolve a privileged actor by trying each strategy in priority order,
/// returning on the first success.
pub fn authorize_admin(ctx: &AdminAuthContext, security: &SecurityConfig) -> Option<AdminActor> {
    for strategy in AuthStrategy::PRIORITY {
        if let Some(actor) = attempt(strategy, ctx, security) {
            if strategy == AuthStrategy::LegacyEmailList {
                tracing::warn!(
                    email = %actor.email,
                    "admin resolved via legacy email list; client should migrate to tokens"
                );
            } else {
                tracing::info!(email = %actor.email, strategy = strategy.as_str(), "admin authorized");
            }
            return Some(actor);
        }
    }
    None
}

fn attempt(
    strategy: AuthStrategy,
    ctx: &AdminAuthContext,
    security: &SecurityConfig,
) -> Option<AdminActor> {
    match strategy {
        AuthStrategy::BearerHeader => {
            let token = ctx.bearer_token.as_deref()?;
            let claims = verify_admin_token(token, &security.admin_secret)?;
            Some(AdminActor { email: claims.email, strategy })
        }
        AuthStrategy::BodyToken => {
            let token = ctx.body_token.as_deref()?;
            let claims = verify_admin_token(token, &security.admin_secret)?;
            Some(AdminActor { email: claims.email, strategy })
        }
        AuthStrategy::LegacyEmailList => {
            let email = ctx.legacy_email.as_deref()?;
            let lowered = email.to_lowercase();
            if security.admin_emails.iter().any(|allowed| *allowed == lowered) {
                Some(AdminActor { email: email.to_string(), strategy })
            } else {
                None
            }
        }
    }
}
