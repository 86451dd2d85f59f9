pub mod authorize;
pub mod token;

pub use authorize::{authorize_admin, AdminActor, AdminAuthContext, AuthStrategy};
pub use token::{issue_admin_token, verify_admin_token, AdminClaims};
