//! Rate limiter deciding which raw progress updates reach the consumer.

use std::time::{Duration, Instant};

/// How often progress may be forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    /// At most one notification per interval.
    Interval(Duration),
    /// One notification each time at least this many bytes were added.
    ByteDelta(u64),
}

/// Tracks the last forwarded update. The first update is always allowed.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    policy: LimitPolicy,
    last: Option<(Instant, u64)>,
}

impl RateLimiter {
    pub fn new(policy: LimitPolicy) -> Self {
        Self { policy, last: None }
    }

    /// Forget the last forwarded update so the next one passes.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Returns true (and records the update) when an update at `now` with
    /// `bytes_done` may be forwarded.
    pub fn allow_at(&mut self, now: Instant, bytes_done: u64) -> bool {
        let allowed = match (self.last, self.policy) {
            (None, _) => true,
            (Some((at, _)), LimitPolicy::Interval(interval)) => now.duration_since(at) >= interval,
            (Some((_, bytes)), LimitPolicy::ByteDelta(delta)) => {
                bytes_done.saturating_sub(bytes) >= delta.max(1)
            }
        };
        if allowed {
            self.last = Some((now, bytes_done));
        }
        allowed
    }

    pub fn allow(&mut self, bytes_done: u64) -> bool {
        self.allow_at(Instant::now(), bytes_done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_burst_is_bounded() {
        let interval = Duration::from_millis(100);
        let duration = Duration::from_millis(1050);
        let mut limiter = RateLimiter::new(LimitPolicy::Interval(interval));
        let start = Instant::now();
        let mut forwarded = 0u64;
        // One raw update every millisecond for the whole burst.
        let mut t = Duration::ZERO;
        while t <= duration {
            if limiter.allow_at(start + t, t.as_millis() as u64) {
                forwarded += 1;
            }
            t += Duration::from_millis(1);
        }
        let bound = (duration.as_nanos() as f64 / interval.as_nanos() as f64).ceil() as u64 + 1;
        assert!(forwarded <= bound, "{forwarded} > {bound}");
        assert!(forwarded >= 10);
    }

    #[test]
    fn first_update_always_passes() {
        let mut limiter = RateLimiter::new(LimitPolicy::Interval(Duration::from_secs(3600)));
        let now = Instant::now();
        assert!(limiter.allow_at(now, 0));
        assert!(!limiter.allow_at(now + Duration::from_secs(1), 100));
    }

    #[test]
    fn byte_delta_policy() {
        let mut limiter = RateLimiter::new(LimitPolicy::ByteDelta(1000));
        let now = Instant::now();
        assert!(limiter.allow_at(now, 0));
        assert!(!limiter.allow_at(now, 999));
        assert!(limiter.allow_at(now, 1000));
        assert!(!limiter.allow_at(now, 1500));
        assert!(limiter.allow_at(now, 2100));
    }

    #[test]
    fn reset_lets_a_smaller_count_through() {
        let mut limiter = RateLimiter::new(LimitPolicy::ByteDelta(100));
        let now = Instant::now();
        assert!(limiter.allow_at(now, 1000));
        assert!(!limiter.allow_at(now, 50));
        limiter.reset();
        assert!(limiter.allow_at(now, 0));
        assert!(!limiter.allow_at(now, 99));
        assert!(limiter.allow_at(now, 100));
    }

    #[test]
    fn zero_delta_still_needs_progress() {
        let mut limiter = RateLimiter::new(LimitPolicy::ByteDelta(0));
        let now = Instant::now();
        assert!(limiter.allow_at(now, 5));
        assert!(!limiter.allow_at(now, 5));
        assert!(limiter.allow_at(now, 6));
    }
}
