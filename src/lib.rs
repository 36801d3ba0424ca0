//! Slidegate - Sliding Window Rate Limiting for HTTP Services
//!
//! This crate limits how many requests each client may make per time window.
//! Counts for the current and previous fixed windows are blended into a
//! sliding estimate, so bursts at window boundaries are smoothed without
//! keeping a log of every request. Limiters plug into axum or any tower
//! stack as a [`RateLimitLayer`](http::RateLimitLayer).

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
