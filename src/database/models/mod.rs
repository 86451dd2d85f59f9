pub mod addon;
pub mod audit;
pub mod business;
pub mod features;
pub mod license;
pub mod login_history;
pub mod membership;
pub mod rate_limit;

pub use addon::LicenseAddon;
pub use audit::{AuditLogEntry, NewAuditLogEntry};
pub use business::{BusinessRecord, BusinessTable, UsageTotals};
pub use features::{FeatureOverrideSet, UserFeatureOverride};
pub use license::{License, LicensePatch, NewLicense, PlanTier, ResourceLimits, VisibilityFlags};
pub use login_history::{DeviceClass, LoginHistoryEntry, NewLoginHistoryEntry};
pub use membership::{MemberRole, Membership, NewMembership};
pub use rate_limit::RateLimitCounter;
