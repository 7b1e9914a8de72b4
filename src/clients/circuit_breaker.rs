use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Error, Result, anyhow};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// In-process circuit breaker for outbound calls. Consecutive failures open
/// the circuit; after the reset timeout a half-open probe decides whether it
/// closes again.
pub struct CircuitBreaker {
    service_name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(service_name: String, config: CircuitBreakerConfig) -> Self {
        info!(service = %service_name, "Circuit breaker initialized");

        Self {
            service_name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        if !self.admit() {
            warn!(service = %self.service_name, "Circuit breaker is open, rejecting request");
            return Err(anyhow!("Circuit breaker is open for {}", self.service_name));
        }

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock_state().state
    }

    /// Decide whether a request may pass, flipping open -> half-open once the
    /// reset timeout has elapsed.
    fn admit(&self) -> bool {
        let mut inner = self.lock_state();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed().as_secs() >= self.config.timeout_seconds)
                    .unwrap_or(true);

                if elapsed {
                    info!(service = %self.service_name, "Circuit breaker attempting reset");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock_state();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                debug!(
                    service = %self.service_name,
                    successes = inner.half_open_successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success recorded"
                );

                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                    info!(
                        service = %self.service_name,
                        "Circuit breaker closed after successful recovery"
                    );
                }
            }
            _ => {
                inner.consecutive_failures = 0;
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock_state();

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                service = %self.service_name,
                "Circuit breaker reopened after failed recovery attempt"
            );
            return;
        }

        inner.consecutive_failures += 1;
        debug!(
            service = %self.service_name,
            failures = inner.consecutive_failures,
            threshold = self.config.failure_threshold,
            "Circuit breaker failure recorded"
        );

        if inner.consecutive_failures >= self.config.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                service = %self.service_name,
                failures = inner.consecutive_failures,
                "Circuit breaker opened due to consecutive failures"
            );
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
