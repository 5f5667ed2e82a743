//! # Circuit Breaker
//!
//! Process-local guard in front of the reasoning engine. After `threshold`
//! consecutive failures the circuit opens for `cooldown`; once the window
//! passes the next call is simply allowed again. There is no half-open probe
//! state: the first call after cooldown is judged on its own outcome.
//!
//! Time comes from an injectable [`Clock`] so cooldown behaviour can be
//! driven deterministically in tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Source of wall-clock time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> u64;
}

/// Reads the system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Hand-driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub threshold: u32,
    /// How long the circuit stays open
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_millis(60_000),
        }
    }
}

/// Point-in-time view of the breaker, suitable for a debug endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub open: bool,
    pub consecutive_failures: u32,
    /// Epoch millis the circuit stays open until; 0 when closed
    pub open_until_ms: u64,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until_ms: u64,
}

/// Consecutive-failure circuit breaker.
///
/// Both fields live behind one mutex, so `is_open`, `record_failure` and
/// `record_success` are each a single critical section and the circuit opens
/// at exactly `threshold` recorded failures under any interleaving.
pub struct CircuitBreaker {
    /// Name used in logs and metric labels
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a breaker that reads the system clock
    pub fn new<S: Into<String>>(name: S, config: Option<CircuitBreakerConfig>) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Creates a breaker driven by the given clock
    pub fn with_clock<S: Into<String>>(
        name: S,
        config: Option<CircuitBreakerConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config: config.unwrap_or_default(),
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns true while the cooldown window is running
    pub fn is_open(&self) -> bool {
        let now = self.clock.now_millis();
        let state = self.lock();
        now < state.open_until_ms
    }

    /// Counts a failure; opens (or re-arms) the circuit once at threshold
    pub fn record_failure(&self) {
        let now = self.clock.now_millis();
        let mut state = self.lock();

        let was_open = now < state.open_until_ms;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.consecutive_failures >= self.config.threshold {
            let cooldown_ms = u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX);
            state.open_until_ms = now.saturating_add(cooldown_ms);

            if was_open {
                debug!(
                    circuit = %self.name,
                    failures = state.consecutive_failures,
                    open_until_ms = state.open_until_ms,
                    "Circuit cooldown re-armed"
                );
            } else {
                warn!(
                    circuit = %self.name,
                    failures = state.consecutive_failures,
                    threshold = self.config.threshold,
                    cooldown_ms = cooldown_ms,
                    "Circuit OPEN: failure threshold reached"
                );
                counter!("triage.circuit_breaker.opened", 1);
            }
        } else {
            debug!(
                circuit = %self.name,
                failures = state.consecutive_failures,
                threshold = self.config.threshold,
                "Circuit failure recorded"
            );
        }
    }

    /// Clears the failure count and closes the circuit immediately
    pub fn record_success(&self) {
        let mut state = self.lock();

        if state.open_until_ms != 0 {
            info!(
                circuit = %self.name,
                failures = state.consecutive_failures,
                "Circuit CLOSED: engine call succeeded"
            );
            counter!("triage.circuit_breaker.closed", 1);
        }

        state.consecutive_failures = 0;
        state.open_until_ms = 0;
    }

    /// Current consecutive failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now_millis();
        let state = self.lock();
        BreakerSnapshot {
            open: now < state.open_until_ms,
            consecutive_failures: state.consecutive_failures,
            open_until_ms: state.open_until_ms,
        }
    }

    // A poisoned lock still guards two plain counters; keep using them
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new("reasoning-engine", None)
    }
}
