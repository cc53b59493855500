//! Sliding-window rate limiting for sensitive actions.
//!
//! Each action key owns a queue of admission timestamps. A call prunes the
//! entries that fell out of the window and is admitted (and recorded) only if
//! fewer than `limit` remain. Prune, count and append happen under one lock.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::clock::{Clock, after, before, remaining};

/// Actions guarded by the limiter. Keys are scoped per subject by the caller
/// (client address for login, account id for admin actions).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    CreateAdmin,
    UpdateAdmin,
    BlockUser,
    BulkBlock,
    DeleteUser,
    LoadUsers,
    LoadReports,
    LoadStats,
    ResolveReport,
    ChangePassword,
}

impl RateLimitAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::CreateAdmin => "createAdmin",
            Self::UpdateAdmin => "updateAdmin",
            Self::BlockUser => "blockUser",
            Self::BulkBlock => "bulkBlock",
            Self::DeleteUser => "deleteUser",
            Self::LoadUsers => "loadUsers",
            Self::LoadReports => "loadReports",
            Self::LoadStats => "loadStats",
            Self::ResolveReport => "resolveReport",
            Self::ChangePassword => "changePassword",
        }
    }

    #[must_use]
    pub fn default_policy(self) -> RateLimitPolicy {
        let (limit, window) = match self {
            Self::Login => (10, Duration::from_secs(60)),
            Self::CreateAdmin => (5, Duration::from_secs(60)),
            Self::UpdateAdmin => (10, Duration::from_secs(60)),
            Self::BlockUser => (20, Duration::from_secs(1)),
            Self::BulkBlock => (5, Duration::from_secs(60)),
            Self::DeleteUser => (10, Duration::from_secs(60)),
            Self::LoadUsers => (10, Duration::from_secs(5)),
            Self::LoadReports => (5, Duration::from_secs(5)),
            Self::LoadStats => (10, Duration::from_secs(5)),
            Self::ResolveReport => (20, Duration::from_secs(60)),
            Self::ChangePassword => (5, Duration::from_secs(60)),
        };
        RateLimitPolicy { limit, window }
    }

    /// Compose the limiter key for this action and subject.
    #[must_use]
    pub fn key(self, subject: &str) -> String {
        format!("{}:{subject}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct Window {
    span: Duration,
    hits: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = before(now, self.span);
        while self.hits.front().is_some_and(|at| *at <= cutoff) {
            self.hits.pop_front();
        }
    }
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    overrides: HashMap<RateLimitAction, RateLimitPolicy>,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            overrides: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, action: RateLimitAction, policy: RateLimitPolicy) -> Self {
        self.overrides.insert(action, policy);
        self
    }

    #[must_use]
    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        self.overrides
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_policy())
    }

    /// Admit and record the call if fewer than `limit` calls happened for
    /// `action_key` within the trailing `window`.
    pub async fn allow(&self, action_key: &str, limit: u32, window: Duration) -> bool {
        self.admit(action_key, limit, window).await.is_none()
    }

    /// Check `action` for `subject` against its configured policy.
    pub async fn check(&self, action: RateLimitAction, subject: &str) -> RateLimitDecision {
        let policy = self.policy(action);
        let key = action.key(subject);
        match self.admit(&key, policy.limit, policy.window).await {
            None => RateLimitDecision::Allowed,
            Some(retry_after) => {
                debug!(key = %key, "rate limited");
                RateLimitDecision::Limited { retry_after }
            }
        }
    }

    /// Returns `None` when admitted, or the time until the oldest hit leaves
    /// the window when limited.
    async fn admit(&self, action_key: &str, limit: u32, window: Duration) -> Option<Duration> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;
        let entry = windows
            .entry(action_key.to_string())
            .or_insert_with(|| Window {
                span: window,
                hits: VecDeque::new(),
            });
        entry.span = window;
        entry.prune(now);

        let count = u32::try_from(entry.hits.len()).unwrap_or(u32::MAX);
        if count >= limit {
            let retry_after = entry
                .hits
                .front()
                .and_then(|oldest| remaining(now, after(*oldest, window)))
                .unwrap_or(window);
            return Some(retry_after);
        }

        entry.hits.push_back(now);
        None
    }

    /// Evict keys whose hits have all left their window.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| {
            window.prune(now);
            !window.hits.is_empty()
        });
        before - windows.len()
    }

    pub async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}
