//! Login rate limiting.
//!
//! Uses the `governor` token bucket per normalized email address so a single
//! account cannot be brute-forced, independent of which client is trying.

use crate::config::AuthConfig;
use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;
use tracing::debug;

/// Type alias for governor's direct rate limiter.
type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Thread-safe login attempt limiter keyed by lowercase email.
#[derive(Debug)]
pub struct LoginRateLimiter {
    limiters: DashMap<String, DirectRateLimiter>,
    attempts_per_minute: NonZeroU32,
}

impl LoginRateLimiter {
    /// Upper bound on tracked emails before the table is reset.
    const MAX_ENTRIES: usize = 10_000;

    pub fn new(config: &AuthConfig) -> Self {
        let attempts_per_minute =
            NonZeroU32::new(config.login_attempts_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiters: DashMap::new(),
            attempts_per_minute,
        }
    }

    /// Check whether another login attempt for `email` is allowed.
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn check(&self, email: &str) -> bool {
        if self.limiters.len() > Self::MAX_ENTRIES {
            self.limiters.clear();
            debug!("cleared login rate limiters (exceeded {} entries)", Self::MAX_ENTRIES);
        }

        let key = email.trim().to_lowercase();
        let limiter = self
            .limiters
            .entry(key)
            .or_insert_with(|| GovRateLimiter::direct(Quota::per_minute(self.attempts_per_minute)));

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(email = %email, "login rate limit exceeded");
        }
        allowed
    }

    /// Forget an email after a successful login.
    pub fn reset(&self, email: &str) {
        self.limiters.remove(&email.trim().to_lowercase());
    }
}
