//! Backoff strategies shared by the health-check stream reconnect loop
//! (spec §4.2.4, capped at 30s) and the retry loop's inter-attempt delay.
//!
//! The topology watcher does *not* use this: spec §4.1.5 schedules its
//! retries on the fixed `refresh_interval` tick rather than backing off,
//! so `gateway-topo` has no dependency on this module (see DESIGN.md).

use std::time::Duration;

/// Computes the delay before the next attempt, given the (0-indexed)
/// attempt number.
pub trait IntervalFunction: Send + Sync {
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// A constant delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    delay: Duration,
}

impl FixedInterval {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

/// Exponential backoff: `initial * multiplier^attempt`, capped at
/// `max_interval`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max_interval: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// The health check stream's default reconnect policy: exponential from
/// 100ms, capped at 30s (spec §4.2.4, §5 "Resource budgets").
pub fn health_stream_reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(Duration::from_millis(100)).max_interval(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_interval_never_changes() {
        let f = FixedInterval::new(Duration::from_secs(1));
        assert_eq!(f.next_interval(0), Duration::from_secs(1));
        assert_eq!(f.next_interval(10), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_doubles_then_caps() {
        let b = ExponentialBackoff::new(Duration::from_millis(100))
            .max_interval(Duration::from_secs(1));
        assert_eq!(b.next_interval(0), Duration::from_millis(100));
        assert_eq!(b.next_interval(1), Duration::from_millis(200));
        assert_eq!(b.next_interval(2), Duration::from_millis(400));
        assert_eq!(b.next_interval(3), Duration::from_millis(800));
        assert_eq!(b.next_interval(4), Duration::from_secs(1));
        assert_eq!(b.next_interval(20), Duration::from_secs(1));
    }

    #[test]
    fn health_stream_default_caps_at_thirty_seconds() {
        let b = health_stream_reconnect_backoff();
        assert_eq!(b.next_interval(100), Duration::from_secs(30));
    }
}
