//! # Reconnect backoff.
//!
//! The delay before reconnect attempt `n` (0-indexed) is `first × factor^n`,
//! clamped to `max`, then jittered. The base is derived from the attempt number
//! alone, so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use relaybus::{JitterPolicy, ReconnectPolicy};
//!
//! let policy = ReconnectPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(policy.next(0), Duration::from_millis(50));
//! assert_eq!(policy.next(2), Duration::from_millis(200));
//! assert_eq!(policy.next(20), Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::policies::JitterPolicy;

/// Backoff between reconnect attempts of the remote bus.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per attempt (`>= 1.0` expected).
    pub factor: f64,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for ReconnectPolicy {
    /// `first = 100ms`, `max = 10s`, `factor = 2.0`, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
