//! Counter backend doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::backend::LimitCounter;
use super::counter::LocalCounter;
use super::window::Window;
use crate::error::BackendError;

/// Wraps a [`LocalCounter`] and counts every backend call.
pub struct CountingCounter {
    inner: LocalCounter,
    gets: AtomicUsize,
    increments: AtomicUsize,
}

impl CountingCounter {
    pub fn new(window_length: Duration) -> Self {
        Self {
            inner: LocalCounter::new(window_length),
            gets: AtomicUsize::new(0),
            increments: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LimitCounter for CountingCounter {
    fn configure(&self, request_limit: u64, window_length: Duration) {
        self.inner.configure(request_limit, window_length);
    }

    async fn increment_by(
        &self,
        key: &str,
        current: Window,
        amount: u64,
    ) -> Result<(), BackendError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.inner.increment_by(key, current, amount).await
    }

    async fn get(
        &self,
        key: &str,
        current: Window,
        previous: Window,
    ) -> Result<(u64, u64), BackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key, current, previous).await
    }
}

/// A backend whose store is unreachable.
pub struct FailingCounter {
    /// Fail reads as well as writes
    pub fail_reads: bool,
}

#[async_trait]
impl LimitCounter for FailingCounter {
    fn configure(&self, _request_limit: u64, _window_length: Duration) {}

    async fn increment_by(
        &self,
        _key: &str,
        _current: Window,
        _amount: u64,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unavailable("connection refused".to_string()))
    }

    async fn get(
        &self,
        _key: &str,
        _current: Window,
        _previous: Window,
    ) -> Result<(u64, u64), BackendError> {
        if self.fail_reads {
            Err(BackendError::Unavailable("connection refused".to_string()))
        } else {
            Ok((0, 0))
        }
    }
}

/// A backend that answers reads only after `delay`.
pub struct SlowCounter {
    pub delay: Duration,
}

#[async_trait]
impl LimitCounter for SlowCounter {
    fn configure(&self, _request_limit: u64, _window_length: Duration) {}

    async fn increment_by(
        &self,
        _key: &str,
        _current: Window,
        _amount: u64,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get(
        &self,
        _key: &str,
        _current: Window,
        _previous: Window,
    ) -> Result<(u64, u64), BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok((0, 0))
    }
}
