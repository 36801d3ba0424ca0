//! Window arithmetic for the sliding-window approximation.
//!
//! Time is cut into fixed-length windows aligned to the UNIX epoch, so every
//! caller that truncates the same instant agrees on the boundaries without
//! coordinating. A client's rate is estimated from only two counts: the
//! current window's and the previous window's, the latter weighted by how
//! much of it still overlaps a full-length window ending now.

use std::time::Duration;

use chrono::{DateTime, Utc};

const MICROS_PER_SEC: i64 = 1_000_000;

/// An epoch-aligned time bucket, identified by its start.
///
/// Windows carry microsecond resolution; shorter window lengths are treated
/// as one microsecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    start_micros: i64,
}

impl Window {
    /// The window of length `length` that contains `now`.
    pub fn containing(now: DateTime<Utc>, length: Duration) -> Self {
        let len = length_micros(length);
        let now = now.timestamp_micros();
        Self {
            start_micros: now - now.rem_euclid(len),
        }
    }

    /// Build a window from its start in microseconds since the epoch.
    pub fn from_start_micros(start_micros: i64) -> Self {
        Self { start_micros }
    }

    /// Start of the window in microseconds since the epoch.
    pub fn start_micros(&self) -> i64 {
        self.start_micros
    }

    /// Start of the window in whole seconds since the epoch.
    pub fn unix_timestamp(&self) -> i64 {
        self.start_micros.div_euclid(MICROS_PER_SEC)
    }

    /// The window immediately before this one.
    pub fn previous(&self, length: Duration) -> Self {
        Self {
            start_micros: self.start_micros.saturating_sub(length_micros(length)),
        }
    }

    /// The window immediately after this one.
    pub fn next(&self, length: Duration) -> Self {
        Self {
            start_micros: self.start_micros.saturating_add(length_micros(length)),
        }
    }

    /// Time between the start of this window and `now`, clamped to
    /// `[0, length]`.
    pub fn elapsed(&self, now: DateTime<Utc>, length: Duration) -> Duration {
        let diff = now
            .timestamp_micros()
            .saturating_sub(self.start_micros)
            .clamp(0, length_micros(length));
        Duration::from_micros(diff as u64)
    }
}

/// `truncate(now, length)`.
pub fn current_window(now: DateTime<Utc>, length: Duration) -> Window {
    Window::containing(now, length)
}

/// `current_window(now, length) - length`.
pub fn previous_window(now: DateTime<Utc>, length: Duration) -> Window {
    current_window(now, length).previous(length)
}

/// Interpolated request rate over a window-length span ending now.
///
/// `prev_count * (length - elapsed) / length + curr_count`. The previous
/// window contributes fully at `elapsed = 0` and nothing at
/// `elapsed = length`. Bursts straddling a boundary can briefly admit close
/// to twice the limit.
pub fn effective_rate(
    curr_count: u64,
    prev_count: u64,
    elapsed: Duration,
    length: Duration,
) -> f64 {
    let length = length.as_secs_f64();
    if length <= 0.0 {
        return curr_count as f64;
    }
    let elapsed = elapsed.as_secs_f64().min(length);
    prev_count as f64 * (length - elapsed) / length + curr_count as f64
}

fn length_micros(length: Duration) -> i64 {
    i64::try_from(length.as_micros()).unwrap_or(i64::MAX).max(1)
}
