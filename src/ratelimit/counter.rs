//! In-process counter backend.

use std::collections::HashMap;
use std::time::Duration;

use ahash::RandomState;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::LimitCounter;
use super::window::Window;
use crate::error::BackendError;

// Fixed seeds keep key hashes stable for the lifetime of the process and
// across limiter instances.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// A counter backend that keeps counts in process memory.
///
/// Only two generations of counts are retained: the window most recently
/// seen (`latest`) and the one before it (`previous`). Generations rotate
/// lazily on the calling thread whenever a call carries a newer window, so
/// memory stays proportional to the number of distinct keys seen in the last
/// two windows and no timer is needed.
///
/// Client keys are reduced to a 64-bit non-cryptographic hash. Two keys that
/// collide share a count, which can only over-count; this is accepted.
pub struct LocalCounter {
    state: Mutex<Generations>,
    hasher: RandomState,
}

struct Generations {
    latest: HashMap<u64, u64>,
    previous: HashMap<u64, u64>,
    latest_window: Option<Window>,
    window_length: Duration,
}

impl Generations {
    /// Bring the generations in line with `current`.
    ///
    /// Same window: nothing to do. Exactly one window later: `latest` becomes
    /// `previous` and a cleared map becomes `latest`. Anything else, including
    /// the first call and a clock that moved backwards, discards all history.
    fn rotate(&mut self, current: Window) {
        match self.latest_window {
            Some(latest) if latest == current => {}
            Some(latest) if latest == current.previous(self.window_length) => {
                self.previous.clear();
                std::mem::swap(&mut self.latest, &mut self.previous);
                self.latest_window = Some(current);
                trace!(
                    window = current.unix_timestamp(),
                    carried = self.previous.len(),
                    "Rotated counter generations"
                );
            }
            stale => {
                if stale.is_some() {
                    debug!(
                        window = current.unix_timestamp(),
                        dropped = self.latest.len() + self.previous.len(),
                        "Discarding stale counter generations"
                    );
                }
                self.latest.clear();
                self.previous.clear();
                self.latest_window = Some(current);
            }
        }
    }
}

impl LocalCounter {
    /// Create an empty counter for windows of `window_length`.
    pub fn new(window_length: Duration) -> Self {
        Self {
            state: Mutex::new(Generations {
                latest: HashMap::new(),
                previous: HashMap::new(),
                latest_window: None,
                window_length,
            }),
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    /// Number of hashed keys held across both generations.
    pub fn tracked_keys(&self) -> usize {
        let state = self.state.lock();
        state.latest.len() + state.previous.len()
    }

    /// The window the `latest` generation represents, if any call was made.
    pub fn latest_window(&self) -> Option<Window> {
        self.state.lock().latest_window
    }

    fn hash(&self, key: &str) -> u64 {
        self.hasher.hash_one(key)
    }
}

#[async_trait]
impl LimitCounter for LocalCounter {
    fn configure(&self, _request_limit: u64, window_length: Duration) {
        self.state.lock().window_length = window_length;
    }

    async fn increment_by(
        &self,
        key: &str,
        current_window: Window,
        amount: u64,
    ) -> Result<(), BackendError> {
        let hkey = self.hash(key);
        let mut state = self.state.lock();
        state.rotate(current_window);

        if amount > 0 {
            let count = state.latest.entry(hkey).or_insert(0);
            *count = count.saturating_add(amount);
        }
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        current_window: Window,
        previous_window: Window,
    ) -> Result<(u64, u64), BackendError> {
        let hkey = self.hash(key);
        let mut state = self.state.lock();
        state.rotate(current_window);

        let curr = state.latest.get(&hkey).copied().unwrap_or(0);
        let prev = if previous_window == current_window.previous(state.window_length) {
            state.previous.get(&hkey).copied().unwrap_or(0)
        } else {
            0
        };
        Ok((curr, prev))
    }
}
