//! Wall-clock sources for window arithmetic.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
///
/// Windows are derived from this instant, so every limiter sharing a counter
/// backend should read the same clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock in UTC. This is the default for every limiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Useful for driving window rotation deterministically in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    /// Create a clock frozen at `secs` seconds after the UNIX epoch.
    pub fn at_unix(secs: i64) -> Self {
        Self {
            nanos: AtomicI64::new(secs.saturating_mul(1_000_000_000)),
        }
    }

    /// Jump to an absolute instant. Moving backwards is allowed.
    pub fn set(&self, instant: DateTime<Utc>) {
        let nanos = instant
            .timestamp_nanos_opt()
            .unwrap_or_else(|| instant.timestamp_micros().saturating_mul(1_000));
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
