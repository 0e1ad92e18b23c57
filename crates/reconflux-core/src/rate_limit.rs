//! Fixed-window per-source call budgets.
//!
//! Each source owns a window of `window` length in which at most `limit`
//! calls are allowed. The counter resets once the window has fully elapsed.
//! Bursts across a window boundary are accepted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::SourceId;

/// Call budget for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    pub const fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(3_600))
    }

    pub const fn per_day(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(86_400))
    }
}

#[derive(Debug)]
struct WindowState {
    budget: RateLimit,
    calls: u32,
    window_start: Instant,
}

/// Thread-safe fixed-window rate limiter keyed by source.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<SourceId, WindowState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: impl IntoIterator<Item = (SourceId, RateLimit)>) -> Self {
        let limiter = Self::new();
        for (source, limit) in limits {
            limiter.set_limit(source, limit);
        }
        limiter
    }

    /// Install or replace the budget of `source`, starting a fresh window.
    pub fn set_limit(&self, source: SourceId, budget: RateLimit) {
        self.lock().insert(
            source,
            WindowState {
                budget,
                calls: 0,
                window_start: Instant::now(),
            },
        );
    }

    /// Consume one call slot for `source`. Returns `false` when the budget is spent.
    ///
    /// Sources without a configured budget are always allowed.
    pub fn allow(&self, source: SourceId) -> bool {
        let mut windows = self.lock();
        let Some(state) = windows.get_mut(&source) else {
            return true;
        };

        let now = Instant::now();
        if now.duration_since(state.window_start) >= state.budget.window {
            state.calls = 0;
            state.window_start = now;
        }

        if state.calls >= state.budget.limit {
            return false;
        }
        state.calls += 1;
        true
    }

    /// Calls left in the current window, or `None` if `source` is unlimited.
    pub fn remaining(&self, source: SourceId) -> Option<u32> {
        let windows = self.lock();
        let state = windows.get(&source)?;
        if state.window_start.elapsed() >= state.budget.window {
            return Some(state.budget.limit);
        }
        Some(state.budget.limit.saturating_sub(state.calls))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SourceId, WindowState>> {
        self.windows
            .lock()
            .expect("rate limiter lock is not poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sixth_call_in_window_is_denied_then_window_resets() {
        let limiter = RateLimiter::with_limits([(
            SourceId::Shodan,
            RateLimit::new(5, Duration::from_secs(60)),
        )]);

        let decisions = (0..6)
            .map(|_| limiter.allow(SourceId::Shodan))
            .collect::<Vec<_>>();
        assert_eq!(decisions, vec![true, true, true, true, true, false]);
        assert_eq!(limiter.remaining(SourceId::Shodan), Some(0));

        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(limiter.allow(SourceId::Shodan));
        assert_eq!(limiter.remaining(SourceId::Shodan), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_burst_is_accepted() {
        let limiter = RateLimiter::with_limits([(
            SourceId::Censys,
            RateLimit::new(1, Duration::from_secs(10)),
        )]);

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(limiter.allow(SourceId::Censys));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.allow(SourceId::Censys));
    }

    #[test]
    fn sources_are_independent_and_unlimited_by_default() {
        let limiter = RateLimiter::with_limits([(
            SourceId::Hunter,
            RateLimit::new(1, Duration::from_secs(3_600)),
        )]);

        assert!(limiter.allow(SourceId::Hunter));
        assert!(!limiter.allow(SourceId::Hunter));
        assert!(limiter.allow(SourceId::Virustotal));
        assert_eq!(limiter.remaining(SourceId::Virustotal), None);
    }
}
