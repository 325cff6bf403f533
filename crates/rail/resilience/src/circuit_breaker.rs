//! Circuit breaker pattern for resilience.
//!
//! One breaker guards one dependency (`circuit_id`). All transitions happen
//! under the breaker's own mutex; breakers for different dependencies never
//! contend. The OPEN to HALF_OPEN transition is lazy: it is observed by the
//! next call attempt once the recovery timeout has elapsed since the last
//! failure, so no background timers are needed.

use crate::config::CircuitBreakerConfig;
use crate::error::{CircuitError, ReflexCircuitOpenError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rail_types::{CircuitState, ClassifiedError, MetricsSink, NoopMetrics};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,

    /// Consecutive failures while closed; failures observed otherwise
    failure_count: u32,

    /// Consecutive probe successes while half-open
    success_count: u32,

    /// Probes admitted in the current half-open period
    half_open_calls: u32,

    /// Bumped on every transition so late results can be recognised
    generation: u64,

    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change_at: DateTime<Utc>,

    open_count: u64,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            generation: 0,
            last_failure: None,
            last_failure_at: None,
            last_state_change_at: Utc::now(),
            open_count: 0,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }
}

/// Three-state circuit breaker for a single dependency.
pub struct CircuitBreaker {
    circuit_id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: Arc<dyn MetricsSink>,
}

impl CircuitBreaker {
    /// Create a breaker for `circuit_id`.
    ///
    /// Thresholds that could strand the circuit in HALF_OPEN are clamped.
    pub fn new(circuit_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let circuit_id = circuit_id.into();
        if let Err(reason) = config.validate() {
            warn!(circuit_id = %circuit_id, %reason, "Clamping circuit breaker config");
        }
        Self {
            circuit_id,
            config: config.normalized(),
            inner: Mutex::new(BreakerState::new()),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn circuit_id(&self) -> &str {
        &self.circuit_id
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state as last observed.
    ///
    /// An OPEN circuit whose recovery timeout has passed still reports OPEN
    /// until the next call attempt moves it to HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `f` through the breaker.
    ///
    /// Fails fast with [`CircuitError::Open`] without invoking `f` while the
    /// circuit is open or the half-open probe quota is used up. A call that
    /// is dropped before completing, or that fails with a cancellation, is
    /// not recorded as a failure.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        let permit = self.acquire().map_err(CircuitError::Open)?;

        match f().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(e) if e.is_cancellation() => {
                permit.release();
                Err(CircuitError::Inner(e))
            }
            Err(e) => {
                permit.record_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Admit a call or reject it.
    pub fn acquire(&self) -> Result<CallPermit<'_>, ReflexCircuitOpenError> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let recovered = inner
                .last_failure
                .map(|at| at.elapsed() >= self.config.recovery_timeout())
                .unwrap_or(true);
            if recovered {
                info!(
                    circuit_id = %self.circuit_id,
                    "Circuit breaker transitioning to half-open after timeout"
                );
                self.transition(&mut inner, CircuitState::HalfOpen);
            }
        }

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        };

        if !admitted {
            inner.total_rejections += 1;
            let err = ReflexCircuitOpenError {
                circuit_id: self.circuit_id.clone(),
                state: inner.state,
                failure_count: inner.failure_count,
            };
            drop(inner);

            debug!(circuit_id = %self.circuit_id, state = %err.state, "Circuit breaker rejected call");
            self.metrics.record_circuit_rejected(&self.circuit_id);
            return Err(err);
        }

        inner.total_calls += 1;
        Ok(CallPermit {
            breaker: self,
            generation: inner.generation,
            probe: inner.state == CircuitState::HalfOpen,
            settled: false,
        })
    }

    fn on_success(&self, generation: u64) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen if inner.generation == generation => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    info!(
                        circuit_id = %self.circuit_id,
                        successes = inner.success_count,
                        "Circuit breaker closing after successful recovery"
                    );
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            _ => {
                debug!(circuit_id = %self.circuit_id, "Late success ignored");
            }
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.failure_count = inner.failure_count.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                inner.last_failure = Some(Instant::now());
                inner.last_failure_at = Some(Utc::now());
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        circuit_id = %self.circuit_id,
                        failures = inner.failure_count,
                        "Circuit breaker opening due to failures"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if inner.generation == generation => {
                inner.last_failure = Some(Instant::now());
                inner.last_failure_at = Some(Utc::now());
                warn!(
                    circuit_id = %self.circuit_id,
                    "Circuit breaker re-opening after half-open failure"
                );
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {
                // Admitted before the circuit opened; the open window stands
            }
        }
    }

    fn on_abandoned(&self, generation: u64, probe: bool) {
        let mut inner = self.inner.lock();
        if probe && inner.state == CircuitState::HalfOpen && inner.generation == generation {
            inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
        }
    }

    /// Force the circuit closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(
            circuit_id = %self.circuit_id,
            old_state = %inner.state,
            "Circuit breaker reset"
        );
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Snapshot of the breaker's state and counters.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let next_retry_at = match (inner.state, inner.last_failure_at) {
            (CircuitState::Open, Some(at)) => chrono::Duration::from_std(self.config.recovery_timeout())
                .ok()
                .map(|timeout| at + timeout),
            _ => None,
        };

        CircuitBreakerStats {
            circuit_id: self.circuit_id.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_at,
            last_state_change_time: inner.last_state_change_at,
            next_retry_at,
            open_count: inner.open_count,
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }

    /// Transition to a new state, resetting counters as needed.
    fn transition(&self, inner: &mut BreakerState, new_state: CircuitState) {
        inner.state = new_state;
        inner.generation += 1;
        inner.last_state_change_at = Utc::now();
        inner.success_count = 0;
        inner.half_open_calls = 0;

        match new_state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.last_failure = None;
            }
            CircuitState::Open => {
                inner.open_count += 1;
                self.metrics.record_circuit_opened(&self.circuit_id);
            }
            CircuitState::HalfOpen => {}
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("circuit_id", &self.circuit_id)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission ticket for one call.
///
/// Dropping it without settling releases a half-open probe slot and records
/// nothing.
#[must_use = "a permit must be settled with the call's outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation);
    }

    /// Give the slot back without recording an outcome
    pub fn release(self) {}
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.generation, self.probe);
        }
    }
}

/// Statistics for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub circuit_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_state_change_time: DateTime<Utc>,

    /// Earliest time a probe may be admitted, while open
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Number of times the circuit has opened
    pub open_count: u64,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

/// Process-wide set of breakers keyed by circuit id.
///
/// Breakers are created on first use and never evicted.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    metrics: Arc<dyn MetricsSink>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get the breaker for a circuit, creating it if needed.
    pub fn get_or_create(&self, circuit_id: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(circuit_id) {
            return breaker.clone();
        }
        self.breakers
            .entry(circuit_id.to_string())
            .or_insert_with(|| {
                debug!(circuit_id, "Creating circuit breaker");
                Arc::new(
                    CircuitBreaker::new(circuit_id, self.config.clone())
                        .with_metrics(self.metrics.clone()),
                )
            })
            .clone()
    }

    pub fn get(&self, circuit_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(circuit_id).map(|b| b.clone())
    }

    /// Run `f` through the breaker for `circuit_id`.
    pub async fn call<T, E, F, Fut>(&self, circuit_id: &str, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        self.get_or_create(circuit_id).call(f).await
    }

    /// Statistics for every breaker, ordered by circuit id
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self.breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.circuit_id.cmp(&b.circuit_id));
        stats
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rail_types::TaskError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CircuitError<TaskError>> {
        breaker
            .call(|| async { Err::<(), _>(TaskError::connection("refused")) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), CircuitError<TaskError>> {
        breaker.call(|| async { Ok::<_, TaskError>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle() {
        let breaker = CircuitBreaker::new("llm", test_config());

        for _ in 0..4 {
            assert!(matches!(fail(&breaker).await, Err(CircuitError::Inner(_))));
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Open: fail fast without invoking the function
        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitError::Open(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(59_999)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let stats = breaker.stats();
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.open_count, 1);
        assert_eq!(stats.total_rejections, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("db", test_config());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.stats().open_count, 2);

        // The failure restarted the recovery window
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_quota() {
        let breaker = CircuitBreaker::new("quota", test_config());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let probes: Vec<_> = (0..3).map(|_| breaker.acquire().unwrap()).collect();
        match breaker.acquire() {
            Err(rejected) => assert_eq!(rejected.state, CircuitState::HalfOpen),
            Ok(_) => panic!("probe quota exceeded"),
        }

        for probe in probes {
            probe.record_success();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_success_threshold_still_recovers() {
        let config = CircuitBreakerConfig {
            half_open_max_calls: 3,
            success_threshold: 5,
            ..test_config()
        };
        let breaker = CircuitBreaker::new("strict", config);
        assert_eq!(breaker.config().success_threshold, 3);

        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        for _ in 0..3 {
            succeed(&breaker).await.unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("svc", test_config());
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        succeed(&breaker).await.unwrap();
        for _ in 0..4 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancellation_not_counted() {
        let breaker = CircuitBreaker::new("svc", test_config());
        for _ in 0..10 {
            let result = breaker
                .call(|| async { Err::<(), _>(TaskError::cancelled()) })
                .await;
            assert!(result.is_err());
        }
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_releases_slot() {
        let config = CircuitBreakerConfig {
            half_open_max_calls: 1,
            ..test_config()
        };
        let breaker = CircuitBreaker::new("svc", config);
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;

        let hung = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, TaskError>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), hung).await;
        assert!(timed_out.is_err());

        // The abandoned probe neither failed the circuit nor kept its slot
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_failures_open_once() {
        let breaker = Arc::new(CircuitBreaker::new("storm", test_config()));
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let breaker = breaker.clone();
                tokio::spawn(async move {
                    let _ = fail(&breaker).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.open_count, 1);
        assert_eq!(stats.total_failures + stats.total_rejections, 64);
    }

    #[tokio::test]
    async fn test_registry_shares_breakers() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get_or_create("a");
        let again = registry.get_or_create("a");
        assert!(Arc::ptr_eq(&a, &again));

        registry
            .call("b", || async { Ok::<_, TaskError>(()) })
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);

        let ids: Vec<String> = registry.stats().into_iter().map(|s| s.circuit_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = CircuitBreaker::new("svc", test_config());
        for _ in 0..5 {
            let _ = fail(&breaker).await;
        }
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        succeed(&breaker).await.unwrap();
    }
}
