//! Exponential backoff for link reconnection.

use rand::Rng;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based): `initial` doubling
/// per attempt up to `max`, with 0-10% jitter.
pub fn reconnect_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = initial.as_millis() as u64;
    let max_ms = max.as_millis() as u64;

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    // Apply jitter (0 to 10% of the delay).
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
