//! HTTP adapter: client keys, response headers, override rules and the
//! tower layer that ties them to a [`RateLimiter`](crate::ratelimit::RateLimiter),
//! plus an outbound layer that paces a client's own requests.

mod client;
mod headers;
mod key;
mod layer;
mod rules;
mod server;

pub use client::{rpm_quota, OutboundLimitLayer, OutboundLimitService};
pub use governor::Quota;
pub use headers::{HeaderNames, ResponseHeaders};
pub use key::{
    canonicalize_ip, compose_keys, key_all, key_by_endpoint, key_by_header, key_by_ip,
    key_by_real_ip, key_func_for, KeyError, KeyFunc, KeyKind,
};
pub use layer::{
    Admission, BackendErrorHandler, KeyErrorHandler, LimitHandler, OverrideFunc,
    RateLimitLayer, RateLimitService,
};
pub use rules::{OverrideRule, OverrideRules};
pub use server::{apply_layers, build_layers, HttpServer};
