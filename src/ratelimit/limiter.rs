//! Core rate limiter implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::backend::LimitCounter;
use super::clock::{Clock, SystemClock};
use super::counter::LocalCounter;
use super::decision::{Decision, RateStatus, RequestOverrides};
use super::window::{effective_rate, Window};
use crate::error::{BackendError, Result, SlidegateError};

/// The decision engine: turns two window counts into an admit/reject verdict.
///
/// Each instance owns its configuration and an async mutex that makes the
/// read-compare-write sequence atomic, so two concurrent requests can never
/// both observe spare budget that only one of them may use. The lock is per
/// limiter, not per key.
pub struct RateLimiter {
    /// Limit applied when a request carries no override
    request_limit: u64,
    window_length: Duration,
    counter: Arc<dyn LimitCounter>,
    clock: Arc<dyn Clock>,
    /// Deadline for each counter backend call
    backend_timeout: Option<Duration>,
    lock: Mutex<()>,
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    request_limit: u64,
    window_length: Duration,
    counter: Option<Arc<dyn LimitCounter>>,
    clock: Option<Arc<dyn Clock>>,
    backend_timeout: Option<Duration>,
}

impl RateLimiterBuilder {
    /// Use a specific counter backend instead of a fresh [`LocalCounter`].
    ///
    /// A backend may be shared between limiters only if they are built with
    /// the same limit and window length.
    pub fn counter(mut self, counter: Arc<dyn LimitCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Read time from `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Bound every counter backend call by `timeout`.
    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<RateLimiter> {
        if self.request_limit == 0 {
            return Err(SlidegateError::InvalidLimit);
        }
        if self.window_length.is_zero() {
            return Err(SlidegateError::InvalidWindow(self.window_length));
        }

        let counter = self
            .counter
            .unwrap_or_else(|| Arc::new(LocalCounter::new(self.window_length)));
        counter.configure(self.request_limit, self.window_length);

        info!(
            limit = self.request_limit,
            window = ?self.window_length,
            "Creating sliding window rate limiter"
        );

        Ok(RateLimiter {
            request_limit: self.request_limit,
            window_length: self.window_length,
            counter,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            backend_timeout: self.backend_timeout,
            lock: Mutex::new(()),
        })
    }
}

impl RateLimiter {
    /// Create a limiter with an in-process counter and the system clock.
    pub fn new(request_limit: u64, window_length: Duration) -> Result<Self> {
        Self::builder(request_limit, window_length).build()
    }

    pub fn builder(request_limit: u64, window_length: Duration) -> RateLimiterBuilder {
        RateLimiterBuilder {
            request_limit,
            window_length,
            counter: None,
            clock: None,
            backend_timeout: None,
        }
    }

    pub fn request_limit(&self) -> u64 {
        self.request_limit
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    /// The counter backend this limiter records into.
    pub fn counter(&self) -> &Arc<dyn LimitCounter> {
        &self.counter
    }

    /// Check `key` with the request's overrides applied.
    ///
    /// Returns `Ok(None)` when the overrides lift the limit for this request;
    /// nothing is read or recorded in that case.
    pub async fn check(
        &self,
        key: &str,
        overrides: &RequestOverrides,
    ) -> std::result::Result<Option<Decision>, BackendError> {
        if overrides.is_unlimited() {
            trace!(key = %key, "Request exempt from rate limit");
            return Ok(None);
        }

        let limit = overrides.resolve_limit(self.request_limit);
        self.check_and_consume(key, limit, overrides.resolve_increment())
            .await
            .map(Some)
    }

    /// Admit or reject `increment` units for `key` against `limit`.
    ///
    /// The comparison uses the unrounded effective rate; rounding is only
    /// applied to the reported remaining budget. An increment of 0 only
    /// checks: it is always admitted and records nothing.
    pub async fn check_and_consume(
        &self,
        key: &str,
        limit: u64,
        increment: u64,
    ) -> std::result::Result<Decision, BackendError> {
        let _guard = self.lock.lock().await;

        let (current, rate) = self.calculate_rate(key).await?;
        let rounded = rate.round() as u64;
        let reset = current.next(self.window_length).unix_timestamp();

        trace!(
            key = %key,
            limit = limit,
            increment = increment,
            rate = rate,
            "Checking rate limit"
        );

        if increment > 0 && rate + increment as f64 > limit as f64 {
            debug!(
                key = %key,
                limit = limit,
                rate = rate,
                increment = increment,
                "Rate limit exceeded"
            );
            return Ok(Decision {
                admitted: false,
                limit,
                remaining: limit.saturating_sub(rounded),
                increment,
                rate,
                reset,
                retry_after: Some(self.window_length),
            });
        }

        if increment > 0 {
            self.bounded(self.counter.increment_by(key, current, increment))
                .await
                .inspect_err(|e| warn!(key = %key, error = %e, "Failed to record request"))?;
        }

        Ok(Decision {
            admitted: true,
            limit,
            remaining: limit.saturating_sub(rounded).saturating_sub(increment),
            increment,
            rate,
            reset,
            retry_after: None,
        })
    }

    /// Current effective rate of `key` against the configured limit, without
    /// consuming anything.
    pub async fn status(&self, key: &str) -> std::result::Result<RateStatus, BackendError> {
        let (_, rate) = self.calculate_rate(key).await?;
        Ok(RateStatus {
            rate,
            within_limit: rate <= self.request_limit as f64,
        })
    }

    async fn calculate_rate(&self, key: &str) -> std::result::Result<(Window, f64), BackendError> {
        let now = self.clock.now();
        let current = Window::containing(now, self.window_length);
        let previous = current.previous(self.window_length);

        let (curr_count, prev_count) = self
            .bounded(self.counter.get(key, current, previous))
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Failed to read counters"))?;

        let elapsed = current.elapsed(now, self.window_length);
        Ok((
            current,
            effective_rate(curr_count, prev_count, elapsed, self.window_length),
        ))
    }

    async fn bounded<T, F>(&self, op: F) -> std::result::Result<T, BackendError>
    where
        F: Future<Output = std::result::Result<T, BackendError>>,
    {
        match self.backend_timeout {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .map_err(|_| BackendError::Timeout(limit))?,
            None => op.await,
        }
    }
}
