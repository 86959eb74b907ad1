//! Exponential backoff with symmetric jitter, per the §4.4.1 formula.
//!
//! `baseDelay = initialTimeout · backoffMultiplier^retryCount`
//! `jitter = uniform(-1, 1) · baseDelay · jitterPercentage / 100`
//! `delay = floor(max(0, baseDelay + jitter))`

use std::time::Duration;

use rand::Rng;

/// Parameters governing a lane's retry backoff, taken directly from the
/// resolved series config's `download` section.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Base timeout in seconds (resolved config's `initialTimeout`).
    pub initial_timeout_secs: f64,
    /// Multiplier applied per retry (resolved config's `backoffMultiplier`).
    pub backoff_multiplier: f64,
    /// Symmetric jitter as a percentage of `baseDelay`, in `[0, 100]`.
    pub jitter_percentage: f64,
}

/// Compute the backoff delay for `retry_count`, including jitter.
///
/// `retry_count` is zero-based: the first retry uses `retry_count = 0`.
#[must_use]
pub fn backoff_delay(config: BackoffConfig, retry_count: u32) -> Duration {
    let base_delay_ms =
        config.initial_timeout_secs * 1000.0 * config.backoff_multiplier.powi(retry_count as i32);
    let jitter_ms = jitter_for(base_delay_ms, config.jitter_percentage, &mut rand::thread_rng());
    let delay_ms = (base_delay_ms + jitter_ms).max(0.0).floor();
    Duration::from_millis(delay_ms as u64)
}

/// Deterministic variant of [`backoff_delay`] without jitter, used to pin
/// the monotonicity property (§8 invariant 5) in tests.
#[must_use]
pub fn base_delay_only(config: BackoffConfig, retry_count: u32) -> Duration {
    let base_delay_ms =
        config.initial_timeout_secs * 1000.0 * config.backoff_multiplier.powi(retry_count as i32);
    Duration::from_millis(base_delay_ms.floor().max(0.0) as u64)
}

fn jitter_for(base_delay_ms: f64, jitter_percentage: f64, rng: &mut impl Rng) -> f64 {
    if jitter_percentage <= 0.0 {
        return 0.0;
    }
    let sign: f64 = rng.gen_range(-1.0..=1.0);
    sign * base_delay_ms * jitter_percentage / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter_percentage: f64) -> BackoffConfig {
        BackoffConfig {
            initial_timeout_secs: 5.0,
            backoff_multiplier: 2.0,
            jitter_percentage,
        }
    }

    #[test]
    fn zero_jitter_matches_exact_exponential_formula() {
        assert_eq!(backoff_delay(config(0.0), 0), Duration::from_millis(5000));
        assert_eq!(backoff_delay(config(0.0), 1), Duration::from_millis(10000));
        assert_eq!(backoff_delay(config(0.0), 2), Duration::from_millis(20000));
    }

    #[test]
    fn backoff_delays_increase_exponentially_without_jitter() {
        let d0 = base_delay_only(config(0.0), 0);
        let d1 = base_delay_only(config(0.0), 1);
        let d2 = base_delay_only(config(0.0), 2);
        assert_eq!(d1, d0 * 2);
        assert_eq!(d2, d1 * 2);
    }

    #[test]
    fn jitter_stays_within_configured_percentage() {
        let cfg = config(20.0);
        let base_ms = 5000.0;
        for _ in 0..500 {
            let delay = backoff_delay(cfg, 0);
            let lower = (base_ms * 0.8).floor() as u64;
            let upper = (base_ms * 1.2).floor() as u64;
            assert!(
                delay.as_millis() as u64 >= lower.saturating_sub(1)
                    && delay.as_millis() as u64 <= upper + 1,
                "delay {:?} outside expected jitter band [{lower}, {upper}]",
                delay
            );
        }
    }

    #[test]
    fn jitter_never_produces_negative_delay() {
        let cfg = config(100.0);
        for _ in 0..500 {
            let delay = backoff_delay(cfg, 0);
            assert!(delay.as_millis() <= 10_000);
        }
    }

    #[test]
    fn backoff_monotonicity_holds_ignoring_jitter() {
        let cfg = config(0.0);
        for k in 0..5 {
            let d_k = base_delay_only(cfg, k);
            let d_k1 = base_delay_only(cfg, k + 1);
            assert!(
                d_k1.as_secs_f64() >= d_k.as_secs_f64() * cfg.backoff_multiplier - f64::EPSILON
            );
        }
    }
}
