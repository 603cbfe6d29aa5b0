//! Retry delay schedules.

use rand::Rng;
use std::time::Duration;

/// Delay schedule between retry attempts. `attempt` is 1-based: the delay
/// after the first failed attempt is `delay(1)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),
    /// `step * attempt`.
    Linear(Duration),
    /// `base * 2^(attempt-1)` capped at `max`, plus up to `jitter` random extra.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: Duration,
    },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential { base, max, jitter } => {
                let factor = 2u32.saturating_pow((attempt - 1).min(20));
                let capped = base.saturating_mul(factor).min(*max);
                let jitter_ms = jitter.as_millis() as u64;
                let extra = if jitter_ms > 0 {
                    rand::thread_rng().gen_range(0..=jitter_ms)
                } else {
                    0
                };
                capped + Duration::from_millis(extra)
            }
        }
    }

    /// No waiting at all. Used by tests and dry runs.
    pub fn none() -> Self {
        Backoff::Fixed(Duration::ZERO)
    }
}
