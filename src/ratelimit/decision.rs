//! Admission verdicts and per-request overrides.

use std::time::Duration;

/// The outcome of one check-and-consume call.
///
/// A rejection is an ordinary value here, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the unit of work may proceed
    pub admitted: bool,
    /// The limit the request was checked against
    pub limit: u64,
    /// Budget left in the sliding window after this request, never negative
    pub remaining: u64,
    /// Weight the request carried
    pub increment: u64,
    /// Unrounded effective rate observed before this request
    pub rate: f64,
    /// UNIX timestamp (seconds) at which the next window starts
    pub reset: i64,
    /// How long a rejected caller should wait, set only on rejection
    pub retry_after: Option<Duration>,
}

impl Decision {
    /// Seconds a rejected caller should wait, rounded up so sub-second
    /// windows never advertise zero.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| {
            let secs = d.as_secs();
            if d.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }
}

/// Read-only view of a key's effective rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateStatus {
    /// Unrounded effective rate
    pub rate: f64,
    /// `rate <= limit`
    pub within_limit: bool,
}

/// Per-request replacement for the limiter's configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOverride {
    /// Check against this limit instead. Zero is ignored.
    Limit(u64),
    /// Skip this limiter entirely.
    NoLimit,
}

/// Overrides carried alongside a single request.
///
/// These are produced per layer, so one layer's overrides never leak into
/// another layer of a stacked chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub limit: Option<LimitOverride>,
    /// Weight of the request. Defaults to 1; 0 checks without consuming.
    pub increment: Option<u64>,
}

impl RequestOverrides {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(LimitOverride::Limit(limit));
        self
    }

    pub fn no_limit(mut self) -> Self {
        self.limit = Some(LimitOverride::NoLimit);
        self
    }

    pub fn with_increment(mut self, increment: u64) -> Self {
        self.increment = Some(increment);
        self
    }

    /// Whether the request should bypass the limiter.
    pub fn is_unlimited(&self) -> bool {
        self.limit == Some(LimitOverride::NoLimit)
    }

    /// The limit to check against, falling back to `default`.
    pub fn resolve_limit(&self, default: u64) -> u64 {
        match self.limit {
            Some(LimitOverride::Limit(limit)) if limit > 0 => limit,
            _ => default,
        }
    }

    /// The request weight, falling back to 1.
    pub fn resolve_increment(&self) -> u64 {
        self.increment.unwrap_or(1)
    }
}
