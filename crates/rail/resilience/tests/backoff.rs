//! Backoff bounds for the retry handler.

use proptest::prelude::*;
use rail_resilience::{RetryConfig, RetryHandler};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Default schedule
// ---------------------------------------------------------------------------

#[test]
fn default_schedule_starts_at_base_and_caps() {
    let handler = RetryHandler::new(RetryConfig::default());
    assert_eq!(handler.backoff_delay(0), Duration::from_millis(1_000));
    assert_eq!(handler.backoff_delay(6), Duration::from_millis(60_000));
}

#[test]
fn schedule_is_monotonic() {
    let handler = RetryHandler::new(RetryConfig::default());
    let delays: Vec<_> = (0..12).map(|a| handler.backoff_delay(a)).collect();
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
}

// ---------------------------------------------------------------------------
// Jitter
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn jittered_delay_within_half_and_one_and_a_half(attempt in 0u32..20) {
        let handler = RetryHandler::new(RetryConfig::default());
        let base = handler.backoff_delay(attempt).as_secs_f64();
        let delay = handler.compute_delay(attempt).as_secs_f64();

        prop_assert!(delay >= base * 0.5 - 1e-6);
        prop_assert!(delay <= base * 1.5 + 1e-6);
    }

    #[test]
    fn pre_jitter_delay_never_exceeds_cap(
        attempt in 0u32..64,
        base_delay_ms in 1u64..10_000,
        max_delay_ms in 1u64..120_000,
    ) {
        let handler = RetryHandler::new(RetryConfig {
            base_delay_ms,
            max_delay_ms,
            ..Default::default()
        });
        prop_assert!(handler.backoff_delay(attempt) <= Duration::from_millis(max_delay_ms));
    }

    #[test]
    fn disabled_jitter_is_exact(attempt in 0u32..20) {
        let handler = RetryHandler::new(RetryConfig {
            jitter: false,
            ..Default::default()
        });
        prop_assert_eq!(handler.compute_delay(attempt), handler.backoff_delay(attempt));
    }
}
