// # Exponential Backoff
//
// Produces the wait durations between fetch attempts.
//
// ## Purpose
//
// A fresh generator is created for every synchronization run. Each call to
// `next()` yields the current delay and advances the internal iteration
// counter; the emitted sequence doubles from `base` until it reaches `cap`
// and stays there. The counter is readable so callers can make
// retry-count-based policy decisions without tracking attempts themselves.
//
// ## Guarantees
//
// - Emitted durations are non-decreasing and never exceed `cap`
// - The iteration counter saturates; there is no overflow however long the
//   loop runs
// - Pure: no clocks, no randomness, no failure modes

use std::time::Duration;

/// Default first delay between attempts
const DEFAULT_BASE: Duration = Duration::from_millis(1000);

/// Default upper bound on the delay between attempts
const DEFAULT_CAP: Duration = Duration::from_secs(2 * 60 * 60);

/// Capped exponential backoff generator
///
/// # Example
///
/// ```rust
/// use statesync_core::backoff::ExponentialBackoff;
/// use std::time::Duration;
///
/// let mut backoff = ExponentialBackoff::new(
///     Duration::from_millis(100),
///     Duration::from_millis(500),
/// );
///
/// assert_eq!(backoff.next(), Duration::from_millis(100));
/// assert_eq!(backoff.next(), Duration::from_millis(200));
/// assert_eq!(backoff.next(), Duration::from_millis(400));
/// assert_eq!(backoff.next(), Duration::from_millis(500));
/// assert_eq!(backoff.next(), Duration::from_millis(500));
/// assert_eq!(backoff.iteration(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
    iteration: u32,
}

impl ExponentialBackoff {
    /// Create a generator with the given base delay and cap
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            iteration: 0,
        }
    }

    /// Create a generator from backoff configuration
    pub fn from_config(config: &crate::config::BackoffConfig) -> Self {
        Self::new(config.base(), config.cap())
    }

    /// The delay for the current iteration, advancing the counter
    ///
    /// Returns `base * 2^iteration` clamped to `[base, cap]`. Once the clamp
    /// is hit it stays hit.
    pub fn next(&mut self) -> Duration {
        let delay = self.current();
        self.iteration = self.iteration.saturating_add(1);
        delay
    }

    /// The delay `next()` would return, without advancing
    pub fn current(&self) -> Duration {
        // 2^63 already overflows any practical Duration; treat large
        // iterations as clamped rather than shifting past the type width.
        let factor = if self.iteration >= 63 {
            None
        } else {
            Some(1u64 << self.iteration)
        };

        let delay = factor
            .and_then(|f| self.base.checked_mul(u32::try_from(f).ok()?))
            .unwrap_or(self.cap);

        delay.clamp(self.base, self.cap)
    }

    /// How many delays have been produced so far
    pub fn iteration(&self) -> u32 {
        self.iteration
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_cap() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
        );

        let delays: Vec<_> = (0..6).map(|_| backoff.next()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
                Duration::from_millis(100),
                Duration::from_millis(100),
            ]
        );
    }

    #[test]
    fn delays_are_non_decreasing_and_capped() {
        let cap = Duration::from_millis(250);
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(3), cap);

        let mut previous = Duration::ZERO;
        for _ in 0..200 {
            let delay = backoff.next();
            assert!(delay >= previous);
            assert!(delay <= cap);
            previous = delay;
        }
    }

    #[test]
    fn iteration_counts_calls() {
        let mut backoff = ExponentialBackoff::default();
        assert_eq!(backoff.iteration(), 0);

        for expected in 1..=10 {
            backoff.next();
            assert_eq!(backoff.iteration(), expected);
        }
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(7200),
        );

        // Far beyond the shift width of the multiplier
        for _ in 0..100 {
            backoff.next();
        }

        assert_eq!(backoff.next(), Duration::from_secs(7200));
        assert_eq!(backoff.iteration(), 101);
    }

    #[test]
    fn current_does_not_advance() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
        );

        assert_eq!(backoff.current(), Duration::from_millis(10));
        assert_eq!(backoff.current(), Duration::from_millis(10));
        assert_eq!(backoff.iteration(), 0);

        backoff.next();
        assert_eq!(backoff.current(), Duration::from_millis(20));
    }
}
