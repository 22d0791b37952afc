//! Rate limiting primitives applied at the request boundary.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

pub trait RateLimiter: Send + Sync {
    fn allow(&self, client_key: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn allow(&self, _client_key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter keyed by client network address.
///
/// Windows are process-local and reset on restart; each key's window resets
/// independently once it elapses.
pub struct FixedWindowRateLimiter {
    capacity: u32,
    window: Duration,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn allow(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !windows.contains_key(client_key) {
            // Keep the map bounded: drop elapsed windows before adding a key.
            windows.retain(|_, window| window.reset_at > now);
            windows.insert(
                client_key.to_string(),
                RateWindow {
                    count: 0,
                    reset_at: now + self.window,
                },
            );
        }

        let Some(window) = windows.get_mut(client_key) else {
            return RateLimitDecision::Allowed;
        };

        if window.reset_at <= now {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count < self.capacity {
            window.count += 1;
            RateLimitDecision::Allowed
        } else {
            let retry_after_seconds = window
                .reset_at
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            RateLimitDecision::Limited {
                retry_after_seconds,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(limiter.allow("10.0.0.1"), RateLimitDecision::Allowed);
    }

    #[test]
    fn capacity_bounds_requests_within_window() {
        let limiter = FixedWindowRateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(limiter.allow("10.0.0.1"), RateLimitDecision::Allowed);
        }
        assert!(matches!(
            limiter.allow("10.0.0.1"),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn keys_have_independent_windows() {
        let limiter = FixedWindowRateLimiter::new(1, Duration::from_secs(60));
        assert_eq!(limiter.allow("10.0.0.1"), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.allow("10.0.0.1"),
            RateLimitDecision::Limited { .. }
        ));
        assert_eq!(limiter.allow("10.0.0.2"), RateLimitDecision::Allowed);
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = FixedWindowRateLimiter::new(1, Duration::from_millis(20));
        assert_eq!(limiter.allow("10.0.0.1"), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.allow("10.0.0.1"),
            RateLimitDecision::Limited { .. }
        ));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.allow("10.0.0.1"), RateLimitDecision::Allowed);
    }

    #[test]
    fn retry_after_hint_is_at_least_one_second() {
        let limiter = FixedWindowRateLimiter::new(1, Duration::from_millis(100));
        limiter.allow("10.0.0.1");
        let RateLimitDecision::Limited {
            retry_after_seconds,
        } = limiter.allow("10.0.0.1")
        else {
            panic!("expected limit to trigger");
        };
        assert!(retry_after_seconds >= 1);
    }

    #[test]
    fn concurrent_increments_stay_within_capacity() {
        use std::sync::Arc;

        let limiter = Arc::new(FixedWindowRateLimiter::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.allow("shared") == RateLimitDecision::Allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
