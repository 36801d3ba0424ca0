//! Outbound request pacing.
//!
//! The inverse of [`RateLimitLayer`](super::RateLimitLayer): instead of
//! rejecting, a client-side layer holds each outgoing request until a token
//! bucket grants a permit, so a client stays under a server's advertised
//! limit.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota};
use http::Request;
use tower::{Layer, Service};
use tracing::debug;

use crate::error::{Result, SlidegateError};

/// A quota of `rpm` requests per minute with bursts of up to `burst`.
pub fn rpm_quota(rpm: u32, burst: u32) -> Result<Quota> {
    let rpm = NonZeroU32::new(rpm).ok_or(SlidegateError::InvalidLimit)?;
    let burst = NonZeroU32::new(burst).ok_or(SlidegateError::InvalidLimit)?;
    Ok(Quota::per_minute(rpm).allow_burst(burst))
}

/// Paces requests sent through the wrapped client service.
///
/// Clones share one bucket, so every service built from the same layer draws
/// from the same budget.
#[derive(Clone)]
pub struct OutboundLimitLayer {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl OutboundLimitLayer {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(DefaultDirectRateLimiter::direct(quota)),
        }
    }

    /// `rpm` requests per minute, bursts of up to `burst`.
    pub fn per_minute(rpm: u32, burst: u32) -> Result<Self> {
        Ok(Self::new(rpm_quota(rpm, burst)?))
    }
}

impl<S> Layer<S> for OutboundLimitLayer {
    type Service = OutboundLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OutboundLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// The service produced by [`OutboundLimitLayer`].
#[derive(Clone)]
pub struct OutboundLimitService<S> {
    inner: S,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<S, B> Service<Request<B>> for OutboundLimitService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let limiter = self.limiter.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            // Dropping this future while it waits abandons the request.
            if limiter.check().is_err() {
                debug!(uri = %request.uri(), "Outbound request waiting for rate limit permit");
                limiter.until_ready().await;
            }
            inner.call(request).await
        })
    }
}
