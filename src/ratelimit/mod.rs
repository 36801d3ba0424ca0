//! Sliding-window rate limiting: window arithmetic, counter backends and the
//! decision engine.

mod backend;
mod clock;
mod counter;
mod decision;
mod limiter;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::LimitCounter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::LocalCounter;
pub use decision::{Decision, LimitOverride, RateStatus, RequestOverrides};
pub use limiter::{RateLimiter, RateLimiterBuilder};
pub use window::Window;
