//! Exponential backoff with jitter for the Web provider client's reconnect
//! loop. A pure function — the caller owns the attempt counter and the
//! actual sleep.

use std::time::{SystemTime, UNIX_EPOCH};

/// Backoff parameters. `max_attempts == 0` means unlimited.
#[derive(Debug, Clone, Copy)]
pub struct BackoffParams {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for BackoffParams {
    fn default() -> Self {
        BackoffParams {
            initial_ms: 5_000,
            max_ms: 300_000,
            factor: 2.0,
            jitter: 0.10,
            max_attempts: 10,
        }
    }
}

/// Outcome of a reconnect-delay computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub delay_ms: u64,
    pub give_up: bool,
}

/// Computes the delay before the next reconnect attempt. `attempt` is
/// zero-based (the first retry after the initial failure is `attempt = 0`).
pub fn next_delay(attempt: u32, params: BackoffParams) -> Decision {
    if params.max_attempts != 0 && attempt >= params.max_attempts {
        return Decision {
            delay_ms: 0,
            give_up: true,
        };
    }

    let base = (params.initial_ms as f64) * params.factor.powi(attempt as i32);
    let capped = base.min(params.max_ms as f64);
    let jitter_factor = 1.0 + jitter_offset(params.jitter);
    let delay_ms = (capped * jitter_factor).max(0.0) as u64;

    Decision {
        delay_ms,
        give_up: false,
    }
}

/// Derives a deterministic pseudo-random value in `[-jitter, +jitter]` from
/// the current timestamp's subsecond nanoseconds, avoiding a `rand`
/// dependency for what is, functionally, cosmetic variance between retries.
fn jitter_offset(jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return 0.0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let fraction = (nanos % 1_000_000) as f64 / 1_000_000.0; // in [0, 1)
    (fraction * 2.0 - 1.0) * jitter
}
