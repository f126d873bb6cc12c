use std::collections::HashMap;

use parking_lot::Mutex;

use crate::utils::clock;

/// Sliding window length in milliseconds.
pub const WINDOW_MS: u64 = 60_000;

/// Endpoints subject to rate limiting. Metrics and health are exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitedEndpoint {
    Chat,
    Retrieve,
}

impl LimitedEndpoint {
    pub fn max_requests(&self) -> usize {
        match self {
            LimitedEndpoint::Chat => 20,
            LimitedEndpoint::Retrieve => 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: usize },
    Limited { retry_after_seconds: u64 },
}

/// Per-`(endpoint, token)` sliding-window limiter.
///
/// Cleanup is lazy: timestamps are pruned on every check and a key is
/// dropped as soon as its window empties, so memory stays bounded by
/// the number of tokens active inside the window. The key is the
/// extracted token value, not the raw header string, so alternating
/// header forms cannot double a token's quota.
pub struct SlidingWindowLimiter {
    table: Mutex<HashMap<(LimitedEndpoint, String), Vec<u64>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, endpoint: LimitedEndpoint, token: &str) -> RateDecision {
        self.check_at(endpoint, token, clock::epoch_millis())
    }

    pub fn check_at(&self, endpoint: LimitedEndpoint, token: &str, now_ms: u64) -> RateDecision {
        let key = (endpoint, token.to_string());
        let cutoff = now_ms.saturating_sub(WINDOW_MS);
        let max_requests = endpoint.max_requests();

        let mut table = self.table.lock();

        if let Some(stamps) = table.get_mut(&key) {
            stamps.retain(|&stamp| stamp > cutoff);
            if stamps.is_empty() {
                table.remove(&key);
            }
        }

        let count = table.get(&key).map_or(0, Vec::len);
        if count >= max_requests {
            // All retained stamps satisfy `stamp + WINDOW_MS > now`, so the
            // computed wait is always at least one second after rounding up.
            let oldest = table
                .get(&key)
                .and_then(|stamps| stamps.first().copied())
                .unwrap_or(now_ms);
            let retry_after_seconds = (oldest + WINDOW_MS - now_ms).div_ceil(1000);
            return RateDecision::Limited {
                retry_after_seconds,
            };
        }

        table.entry(key).or_default().push(now_ms);
        RateDecision::Allowed {
            remaining: max_requests - (count + 1),
        }
    }

    /// Number of live `(endpoint, token)` entries, for observability.
    pub fn active_keys(&self) -> usize {
        self.table.lock().len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}
