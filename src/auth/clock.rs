//! Time source shared by the ledger, limiter, sessions and audit trail.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock, millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(step, Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// `at + duration`, clamped to the last representable instant.
pub(crate) fn after(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - duration`, clamped to the first representable instant. A window that
/// reaches past it covers all recorded history.
pub(crate) fn before(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Remaining time until `until`, or `None` once it has passed.
pub(crate) fn remaining(now: DateTime<Utc>, until: DateTime<Utc>) -> Option<Duration> {
    if now < until {
        until.signed_duration_since(now).to_std().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(90));
        assert_eq!(
            (clock.now() - start).num_seconds(),
            90,
            "clock should move forward by the requested amount"
        );
    }

    #[test]
    fn remaining_is_none_once_elapsed() {
        let now = Utc::now();
        let later = now + TimeDelta::seconds(10);
        assert_eq!(remaining(now, later), Some(Duration::from_secs(10)));
        assert_eq!(remaining(later, now), None);
        assert_eq!(remaining(now, now), None);
    }

    #[test]
    fn offsets_clamp_instead_of_overflowing() {
        let now = Utc::now();
        assert_eq!(after(now, Duration::from_secs(5)), now + TimeDelta::seconds(5));
        assert_eq!(before(now, Duration::from_secs(5)), now - TimeDelta::seconds(5));

        assert_eq!(after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(before(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
        let huge = Duration::from_millis(u64::MAX);
        assert_eq!(after(now, huge), DateTime::<Utc>::MAX_UTC);
        assert_eq!(before(now, huge), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn remaining_until_the_end_of_time() {
        let now = Utc::now();
        let forever = remaining(now, DateTime::<Utc>::MAX_UTC);
        assert!(forever.is_some_and(|left| left > Duration::from_secs(86_400 * 365 * 1000)));
    }
}
