//! Sliding-window rate limiting for authenticated calls.
//!
//! One limiter is shared by every authenticated request. [`RateLimiter::acquire`]
//! suspends the caller until both the window cap and the minimum spacing
//! allow another request; it never fails.

use std::collections::VecDeque;
use std::time::Duration;

use grapnel_core::RateLimitConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
struct WindowState {
    /// Grant times inside the current window, oldest first.
    grants: VecDeque<Instant>,
    last_grant: Option<Instant>,
}

/// Sliding-window limiter with a minimum delay between consecutive grants.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    min_delay: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Creates a limiter from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(
            config.max_requests as usize,
            config.window(),
            config.request_delay(),
        )
    }

    /// Creates a limiter from raw limits. A zero cap is treated as one.
    pub fn with_limits(max_requests: usize, window: Duration, min_delay: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            min_delay,
            state: Mutex::new(WindowState {
                grants: VecDeque::new(),
                last_grant: None,
            }),
        }
    }

    /// Waits for a slot and claims it. Returns how long the caller waited.
    ///
    /// Cancel-safe: a slot is only recorded once it is granted, so dropping
    /// the future while it sleeps leaves the limiter untouched.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                self.prune(&mut state, now);

                let wait = self.wait_needed(&state, now);
                if wait.is_zero() {
                    state.grants.push_back(now);
                    state.last_grant = Some(now);
                    let waited = now.duration_since(started);
                    trace!(in_window = state.grants.len(), waited = ?waited, "Rate limit slot granted");
                    return waited;
                }
                wait
            };

            debug!(wait = ?wait, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of grants inside the current window.
    pub async fn in_window(&self) -> usize {
        let mut state = self.state.lock().await;
        self.prune(&mut state, Instant::now());
        state.grants.len()
    }

    /// How long an `acquire` issued now would wait.
    pub async fn time_until_available(&self) -> Duration {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.prune(&mut state, now);
        self.wait_needed(&state, now)
    }

    fn prune(&self, state: &mut WindowState, now: Instant) {
        while let Some(&oldest) = state.grants.front() {
            if now.duration_since(oldest) >= self.window {
                state.grants.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_needed(&self, state: &WindowState, now: Instant) -> Duration {
        let window_wait = if state.grants.len() >= self.max_requests {
            state
                .grants
                .front()
                .map_or(Duration::ZERO, |&oldest| {
                    (oldest + self.window).saturating_duration_since(now)
                })
        } else {
            Duration::ZERO
        };

        let spacing_wait = state.last_grant.map_or(Duration::ZERO, |last| {
            (last + self.min_delay).saturating_duration_since(now)
        });

        window_wait.max(spacing_wait)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let limiter = RateLimiter::with_limits(5, Duration::from_secs(60), Duration::from_secs(2));
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.in_window().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_between_calls() {
        let limiter = RateLimiter::with_limits(100, Duration::from_secs(3600), Duration::from_secs(2));
        let mut grants = Vec::new();
        for _ in 0..4 {
            limiter.acquire().await;
            grants.push(Instant::now());
        }
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_call_waits_for_window_boundary() {
        let window = Duration::from_secs(10);
        let limiter = RateLimiter::with_limits(3, window, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < window);

        limiter.acquire().await;
        assert!(start.elapsed() >= window);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::with_limits(
            10,
            Duration::from_secs(60),
            Duration::from_millis(500),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_acquire_claims_nothing() {
        let limiter = RateLimiter::with_limits(1, Duration::from_secs(30), Duration::ZERO);
        limiter.acquire().await;

        let cancelled =
            tokio::time::timeout(Duration::from_secs(1), limiter.acquire()).await;
        assert!(cancelled.is_err());
        assert_eq!(limiter.in_window().await, 1);
    }
}
