//! # Fibonacci Backoff
//!
//! Requeue delays for KataConfig reconciliations that returned an error.
//! The delay grows along the Fibonacci sequence, more slowly than exponential
//! backoff, so a failing image job or an unreachable API server is retried
//! promptly at first without hammering the cluster later.
//!
//! With the controller defaults (15s minimum, 5m maximum) the sequence is
//! 15s, 15s, 30s, 45s, 75s, 120s, 195s, 300s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, starting from `min` twice and
/// capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new backoff between `min` and `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);
        result
    }

    /// Reset the backoff to the initial state (after a successful reconciliation)
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}
