//! # RAIL Resilience
//!
//! Enforcement primitives wrapped around RAIL-mode jobs.
//!
//! - [`RetryHandler`]: bounded retries with exponential backoff and jitter,
//!   cancellable through a [`CancellationToken`]
//! - [`CircuitBreaker`]: CLOSED / OPEN / HALF_OPEN breaker per dependency
//! - [`CircuitBreakerRegistry`]: lazily created breakers keyed by circuit id
//!
//! Circuit rejections surface as [`ReflexCircuitOpenError`] so they are never
//! mistaken for a failed attempt.

#![deny(unsafe_code)]

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats};
pub use config::{CircuitBreakerConfig, RetryConfig};
pub use error::{
    BudgetRetryExhaustedError, CircuitError, ReflexCircuitOpenError, RetryAttemptRecord,
    RetryError,
};
pub use retry::{RetryHandler, RetryScope};
pub use tokio_util::sync::CancellationToken;
