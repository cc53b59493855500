//! Failed-attempt ledger and lockout state, keyed by server-derived identity.
//!
//! Flow Overview:
//! 1) Each failure prunes timestamps older than the attempt window, then appends.
//! 2) Reaching the threshold sets `lockout_until` and clears the sequence.
//! 3) While locked, further failures are ignored (the lockout is not extended).
//! 4) Expired lockouts are purged lazily on the next read, or by `sweep`.
//!
//! The whole read-prune-append step runs under one lock, so two concurrent
//! failures for the same identity can never both observe "below threshold".
//!
//! Logins reserve an `AttemptSlot` before verifying a password. In-flight slots
//! count toward the threshold, so no more than `max_attempts` guesses are ever
//! checked per window, however many requests race. A slot is settled as a
//! failure or success, and dropping it unsettled just releases the reservation.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::clock::{Clock, after, before, remaining};
use super::config::LockoutPolicy;

/// Identity the ledger tracks: the normalized account email. Never built from a
/// value the client reports about itself, such as an IP in the request body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    #[must_use]
    pub fn account(email_normalized: &str) -> Self {
        Self(format!("account:{email_normalized}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Retry hint when every remaining attempt is already being verified.
pub const IN_FLIGHT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureOutcome {
    pub blocked: bool,
    pub remaining_attempts: u32,
}

#[derive(Debug, Default)]
struct AttemptRecord {
    failures: VecDeque<DateTime<Utc>>,
    lockout_until: Option<DateTime<Utc>>,
    in_flight: Arc<AtomicU32>,
}

impl AttemptRecord {
    fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = before(now, window);
        while self.failures.front().is_some_and(|at| *at <= cutoff) {
            self.failures.pop_front();
        }
    }

    /// Drop an elapsed lockout. Returns true if one was dropped.
    fn expire_lockout(&mut self, now: DateTime<Utc>) -> bool {
        match self.lockout_until {
            Some(until) if now >= until => {
                self.lockout_until = None;
                self.failures.clear();
                true
            }
            _ => false,
        }
    }

    fn is_idle(&self) -> bool {
        self.failures.is_empty()
            && self.lockout_until.is_none()
            && self.in_flight.load(Ordering::SeqCst) == 0
    }
}

/// A reserved password check for one identity.
#[must_use = "an unsettled slot only releases its reservation"]
#[derive(Debug)]
pub struct AttemptSlot {
    key: IdentityKey,
    in_flight: Arc<AtomicU32>,
}

impl AttemptSlot {
    #[must_use]
    pub fn identity(&self) -> &IdentityKey {
        &self.key
    }
}

impl Drop for AttemptSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AttemptLedger {
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<IdentityKey, AttemptRecord>>,
}

impl AttemptLedger {
    #[must_use]
    pub fn new(policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Reserve a password check for `key`.
    ///
    /// # Errors
    /// Returns the retry-after hint while `key` is locked out, or
    /// `IN_FLIGHT_RETRY_AFTER` when failures plus in-flight checks already
    /// reach the threshold.
    pub async fn begin_attempt(&self, key: &IdentityKey) -> Result<AttemptSlot, Duration> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let record = records.entry(key.clone()).or_default();

        record.expire_lockout(now);
        if let Some(until) = record.lockout_until {
            return Err(remaining(now, until).unwrap_or(IN_FLIGHT_RETRY_AFTER));
        }

        record.prune(now, self.policy.attempt_window);
        let failures = u32::try_from(record.failures.len()).unwrap_or(u32::MAX);
        let in_flight = record.in_flight.load(Ordering::SeqCst);
        if failures.saturating_add(in_flight) >= self.policy.max_attempts {
            debug!(identity = %key, failures, in_flight, "attempt refused, threshold reserved");
            return Err(IN_FLIGHT_RETRY_AFTER);
        }

        record.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(AttemptSlot {
            key: key.clone(),
            in_flight: record.in_flight.clone(),
        })
    }

    /// Settle a reserved check as a failed authentication.
    pub async fn settle_failure(&self, slot: AttemptSlot) -> FailureOutcome {
        // The failure lands before the reservation is released, never after.
        let outcome = self.record_failure(&slot.key).await;
        drop(slot);
        outcome
    }

    /// Settle a reserved check as a successful authentication. Returns the
    /// time left if a lockout is active, in which case nothing is cleared.
    pub async fn settle_success(&self, slot: AttemptSlot) -> Option<Duration> {
        let key = slot.key.clone();
        drop(slot);
        self.clear(&key).await
    }

    /// Record a failed authentication for `key`.
    pub async fn record_failure(&self, key: &IdentityKey) -> FailureOutcome {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let record = records.entry(key.clone()).or_default();

        record.expire_lockout(now);
        if record.lockout_until.is_some() {
            // Lockout duration is fixed when set; failures during it do not count.
            return FailureOutcome {
                blocked: true,
                remaining_attempts: 0,
            };
        }

        record.prune(now, self.policy.attempt_window);
        record.failures.push_back(now);

        let count = u32::try_from(record.failures.len()).unwrap_or(u32::MAX);
        if count >= self.policy.max_attempts {
            record.lockout_until = Some(after(now, self.policy.lockout_duration));
            record.failures.clear();
            warn!(identity = %key, "identity locked out after {count} failed attempts");
            return FailureOutcome {
                blocked: true,
                remaining_attempts: 0,
            };
        }

        debug!(identity = %key, failures = count, "recorded failed attempt");
        FailureOutcome {
            blocked: false,
            remaining_attempts: self.policy.max_attempts - count,
        }
    }

    /// True only while `now < lockout_until`.
    pub async fn is_blocked(&self, key: &IdentityKey) -> bool {
        self.lockout_remaining(key).await.is_some()
    }

    /// Time left on an active lockout, used for the retry-after hint.
    pub async fn lockout_remaining(&self, key: &IdentityKey) -> Option<Duration> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let record = records.get_mut(key)?;

        if record.expire_lockout(now) {
            if record.is_idle() {
                records.remove(key);
            }
            return None;
        }
        record.lockout_until.and_then(|until| remaining(now, until))
    }

    /// Forget the failures for `key` after a successful authentication. An
    /// active lockout is left in place and its remaining time returned.
    pub async fn clear(&self, key: &IdentityKey) -> Option<Duration> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let record = records.get_mut(key)?;

        record.expire_lockout(now);
        if let Some(until) = record.lockout_until {
            return remaining(now, until);
        }
        record.failures.clear();
        if record.is_idle() {
            records.remove(key);
        }
        None
    }

    /// Evict expired lockouts and records with no failures left in the window.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.policy.attempt_window;
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| {
            record.expire_lockout(now);
            record.prune(now, window);
            !record.is_idle()
        });
        before - records.len()
    }

    pub async fn tracked(&self) -> usize {
        self.records.lock().await.len()
    }
}

impl fmt::Debug for AttemptLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptLedger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
