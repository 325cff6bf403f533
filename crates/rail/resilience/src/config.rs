//! Configuration for retries and circuit breakers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub base_delay_ms: u64,

    /// Ceiling applied before jitter.
    pub max_delay_ms: u64,

    /// Growth factor per attempt.
    pub exponential_base: f64,

    /// Multiply each delay by a uniform factor in [0.5, 1.5].
    pub jitter: bool,

    /// Retries allowed when no budget is supplied.
    pub default_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
            default_max_retries: 3,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures to open the circuit.
    pub failure_threshold: u32,

    /// Time since the last failure before a probe is let through.
    pub recovery_timeout_ms: u64,

    /// Maximum probe calls admitted while half-open.
    pub half_open_max_calls: u32,

    /// Consecutive probe successes needed to close the circuit.
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// Check that a half-open circuit can always close again.
    ///
    /// Every threshold must be at least 1, and `success_threshold` may not
    /// exceed `half_open_max_calls`.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.half_open_max_calls == 0 {
            return Err("circuit_breaker.half_open_max_calls must be at least 1".to_string());
        }
        if self.success_threshold == 0 {
            return Err("circuit_breaker.success_threshold must be at least 1".to_string());
        }
        if self.success_threshold > self.half_open_max_calls {
            return Err(format!(
                "circuit_breaker.success_threshold ({}) exceeds half_open_max_calls ({})",
                self.success_threshold, self.half_open_max_calls
            ));
        }
        Ok(())
    }

    /// Clamp thresholds into the range [`validate`](Self::validate) accepts.
    pub fn normalized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.half_open_max_calls = self.half_open_max_calls.max(1);
        self.success_threshold = self
            .success_threshold
            .clamp(1, self.half_open_max_calls);
        self
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_circuit_config_is_valid() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unreachable_success_threshold_rejected() {
        let config = CircuitBreakerConfig {
            half_open_max_calls: 3,
            success_threshold: 5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("exceeds half_open_max_calls"));

        let fixed = config.normalized();
        assert_eq!(fixed.success_threshold, 3);
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn test_zero_thresholds_clamped() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            half_open_max_calls: 0,
            success_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let fixed = config.normalized();
        assert_eq!(fixed.failure_threshold, 1);
        assert_eq!(fixed.half_open_max_calls, 1);
        assert_eq!(fixed.success_threshold, 1);
    }
}
