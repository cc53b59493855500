//! Runtime configuration for the authentication core.

use std::time::Duration;

use super::{limiter::RateLimitPolicy, retry::RetryPolicy};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound on how stale a cached "account is active" answer may be.
pub const MAX_LIVENESS_STALENESS: Duration = Duration::from_secs(5);

/// Failed-attempt threshold and timings for the attempt ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_window: DEFAULT_ATTEMPT_WINDOW,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    lockout: LockoutPolicy,
    session_ttl: Duration,
    liveness_cache_ttl: Duration,
    retry: RetryPolicy,
    login_rate_limit: RateLimitPolicy,
    trust_proxy_headers: bool,
    session_cookie_secure: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lockout: LockoutPolicy::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            liveness_cache_ttl: MAX_LIVENESS_STALENESS,
            retry: RetryPolicy::default(),
            login_rate_limit: super::limiter::RateLimitAction::Login.default_policy(),
            trust_proxy_headers: false,
            session_cookie_secure: true,
        }
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Values above [`MAX_LIVENESS_STALENESS`] are clamped.
    #[must_use]
    pub fn with_liveness_cache_ttl(mut self, ttl: Duration) -> Self {
        self.liveness_cache_ttl = ttl.min(MAX_LIVENESS_STALENESS);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_login_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.login_rate_limit = policy;
        self
    }

    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn lockout(&self) -> LockoutPolicy {
        self.lockout
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn liveness_cache_ttl(&self) -> Duration {
        self.liveness_cache_ttl
    }

    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    #[must_use]
    pub fn login_rate_limit(&self) -> RateLimitPolicy {
        self.login_rate_limit
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
