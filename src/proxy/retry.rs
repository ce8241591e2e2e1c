//! Retry backoff for upstream attempts

use crate::domain::BackoffPolicy;
use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (zero-based).
///
/// Exponential growth from `initial`, clamped to `max`. With jitter enabled
/// up to 25% is added, still bounded by `max`.
pub fn calculate_backoff(policy: &BackoffPolicy, attempt: u32) -> Duration {
    let multiplier = if policy.multiplier.is_finite() && policy.multiplier >= 1.0 {
        policy.multiplier
    } else {
        1.0
    };
    let max = policy.max();
    let initial = policy.initial().min(max);

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = initial.as_secs_f64() * multiplier.powi(exponent);
    let clamped = if base.is_finite() {
        base.min(max.as_secs_f64()).max(0.0)
    } else {
        max.as_secs_f64()
    };
    let duration = Duration::from_secs_f64(clamped);

    let duration = if policy.jitter {
        let factor = rand::thread_rng().gen_range(0.0..=0.25);
        duration + duration.mul_f64(factor)
    } else {
        duration
    };

    duration.min(max)
}
