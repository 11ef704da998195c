// Resilience module
// Per-service circuit breakers shared by outbound API clients


use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN_SECONDS: u64 = 30;

/// Breaker lifecycle for a single upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Too many consecutive failures; calls are refused until the cooldown
    /// elapses.
    Open,
    /// Cooldown elapsed; a single probe call is allowed through.
    HalfOpen,
}

#[derive(Debug)]
struct ServiceBreaker {
    failure_count: u32,
    last_failure: Option<Instant>,
    state: CircuitState,
}

impl ServiceBreaker {
    fn new() -> Self {
        Self {
            failure_count: 0,
            last_failure: None,
            state: CircuitState::Closed,
        }
    }

    fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = CircuitState::Closed;
    }

    /// Returns true when this failure moved the breaker into `Open`.
    fn record_failure(&mut self, threshold: u32) -> bool {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());
        if self.failure_count >= threshold && self.state != CircuitState::Open {
            self.state = CircuitState::Open;
            return true;
        }
        false
    }

    fn should_attempt(&mut self, cooldown: Duration) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure
                    .is_none_or(|failed_at| failed_at.elapsed() > cooldown);
                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                }
                cooled_down
            }
        }
    }
}

/// Tracks consecutive failures per named service and fails fast while a
/// service is unhealthy.
///
/// A service opens after `failure_threshold` consecutive failures and
/// refuses calls until `cooldown` has elapsed, at which point one probe is
/// allowed through. Any successful call fully closes the breaker again.
#[derive(Debug)]
pub struct CircuitBreaker {
    services: Mutex<HashMap<String, ServiceBreaker>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl Default for CircuitBreaker {
    #[inline]
    fn default() -> Self {
        Self::new(
            DEFAULT_FAILURE_THRESHOLD,
            Duration::from_secs(DEFAULT_COOLDOWN_SECONDS),
        )
    }
}

impl CircuitBreaker {
    #[inline]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Whether a call to `service` may proceed right now. An open breaker
    /// flips to half-open once its cooldown has elapsed.
    #[inline]
    pub fn should_attempt(&self, service: &str) -> bool {
        let mut services = self.lock_services();
        let breaker = services
            .entry(service.to_string())
            .or_insert_with(ServiceBreaker::new);
        let allowed = breaker.should_attempt(self.cooldown);
        if !allowed {
            warn!(
                "Circuit breaker is open for {}; skipping call after {} consecutive failures",
                service, breaker.failure_count
            );
        }
        allowed
    }

    #[inline]
    pub fn record_success(&self, service: &str) {
        let mut services = self.lock_services();
        if let Some(breaker) = services.get_mut(service) {
            breaker.record_success();
        }
    }

    #[inline]
    pub fn record_failure(&self, service: &str) {
        let mut services = self.lock_services();
        let breaker = services
            .entry(service.to_string())
            .or_insert_with(ServiceBreaker::new);
        if breaker.record_failure(self.failure_threshold) {
            warn!(
                "Circuit breaker opened for {} after {} consecutive failures",
                service, breaker.failure_count
            );
        }
    }

    /// Current state for `service`; unknown services report `Closed`.
    #[inline]
    pub fn state(&self, service: &str) -> CircuitState {
        self.lock_services()
            .get(service)
            .map_or(CircuitState::Closed, |breaker| breaker.state)
    }

    fn lock_services(&self) -> MutexGuard<'_, HashMap<String, ServiceBreaker>> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
