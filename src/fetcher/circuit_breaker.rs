//! Circuit breaker that keeps a failing search backend out of the fetch path

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,   // Normal operation
    Open,     // Failing, skip the backend
    HalfOpen, // One trial request allowed
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: usize,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            opened_at: None,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-backend circuit breaker
pub struct CircuitBreaker {
    backends: DashMap<String, BreakerEntry>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            backends: DashMap::new(),
            config,
        }
    }

    /// Whether requests to `backend` should be skipped right now
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open
    /// and lets the next request through.
    pub fn is_open(&self, backend: &str) -> bool {
        let Some(mut entry) = self.backends.get_mut(backend) else {
            return false;
        };

        match entry.state {
            BreakerState::Closed | BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let elapsed = entry
                    .opened_at
                    .map(|opened| opened.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(false);
                if elapsed {
                    entry.state = BreakerState::HalfOpen;
                    false
                } else {
                    true
                }
            }
        }
    }

    pub fn mark_success(&self, backend: &str) {
        self.backends.insert(backend.to_string(), BreakerEntry::default());
    }

    pub fn mark_failure(&self, backend: &str) {
        let mut entry = self.backends.entry(backend.to_string()).or_default();
        entry.consecutive_failures += 1;
        entry.last_failure = Some(Instant::now());

        // A failed half-open trial reopens immediately
        if entry.state == BreakerState::HalfOpen
            || entry.consecutive_failures >= self.config.failure_threshold
        {
            entry.state = BreakerState::Open;
            entry.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self, backend: &str) -> BreakerState {
        self.backends
            .get(backend)
            .map(|e| e.state)
            .unwrap_or(BreakerState::Closed)
    }

    pub fn stats(&self, backend: &str) -> BreakerStats {
        self.backends
            .get(backend)
            .map(|entry| BreakerStats {
                state: entry.state,
                consecutive_failures: entry.consecutive_failures,
                last_failure: entry.last_failure,
            })
            .unwrap_or(BreakerStats {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            })
    }

    pub fn reset(&self, backend: &str) {
        self.backends.remove(backend);
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: usize,
    pub last_failure: Option<Instant>,
}
