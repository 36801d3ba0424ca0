//! Counter backend trait for abstracting in-process and shared count stores.

use std::time::Duration;

use async_trait::async_trait;

use super::window::Window;
use crate::error::BackendError;

/// Storage for per-client counts keyed by time window.
///
/// The decision engine only ever asks for the current and previous window of
/// a key, so an implementation needs to retain at most two windows per key.
/// Implementations that talk to a shared store may block on I/O inside
/// `increment_by` and `get`; the engine bounds those calls with its backend
/// timeout and reports a timeout as [`BackendError::Timeout`].
#[async_trait]
pub trait LimitCounter: Send + Sync {
    /// Apply limiter-wide parameters. Called once when a limiter is built.
    fn configure(&self, request_limit: u64, window_length: Duration);

    /// Record one unit for `key` in `current_window`.
    async fn increment(&self, key: &str, current_window: Window) -> Result<(), BackendError> {
        self.increment_by(key, current_window, 1).await
    }

    /// Atomically add `amount` to the count for `key` in `current_window`.
    async fn increment_by(
        &self,
        key: &str,
        current_window: Window,
        amount: u64,
    ) -> Result<(), BackendError>;

    /// Counts for `key` in `(current_window, previous_window)`.
    ///
    /// Must observe every increment that completed before the call was made.
    async fn get(
        &self,
        key: &str,
        current_window: Window,
        previous_window: Window,
    ) -> Result<(u64, u64), BackendError>;
}
