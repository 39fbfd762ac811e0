//! Circuit breaker: closed / open / half-open (spec.md §4.2).
//!
//! State transitions go through `Store::update`, so the on-disk document is
//! the single source of truth across processes. `Allow` has a fast path for
//! the common case: a `Load`-only read that admits without taking the write
//! lock when the last-known state is closed. This can admit on a closed read
//! that has since tripped open in another process — spec.md's fail-open
//! model accepts that staleness in exchange for not rewriting the document
//! on every closed-state admission.

use std::time::Duration;

use crate::core::config::BreakerConfig;
use crate::core::errors::{BcqError, Result};
use crate::core::timestamp::{is_zero, now};
use crate::resilience::state::{BreakerPhase, CircuitBreakerState};
use crate::resilience::store::Store;

/// Circuit breaker bound to a store and its configured thresholds.
#[derive(Debug, Clone)]
pub struct Breaker<'a> {
    store: &'a Store,
    config: &'a BreakerConfig,
}

impl<'a> Breaker<'a> {
    #[must_use]
    pub fn new(store: &'a Store, config: &'a BreakerConfig) -> Self {
        Self { store, config }
    }

    /// Ask whether an operation may proceed. On an open circuit past its
    /// timeout, transitions to half-open and reserves one of its limited
    /// trial slots atomically with the admission decision.
    ///
    /// # Errors
    /// Returns `BcqError::CircuitOpen` when the breaker denies admission, or
    /// a store I/O error. A store error still fails open: callers that
    /// ignore a non-admission-denial error and proceed match spec.md's
    /// fail-open posture for this primitive.
    pub fn allow(&self) -> Result<()> {
        if self.store.load()?.circuit_breaker.state == BreakerPhase::Closed {
            return Ok(());
        }

        let mut admitted = false;
        self.store.update(|state| {
            apply_stale_cleanup(&mut state.circuit_breaker, self.config);
            admitted = decide_admission(&mut state.circuit_breaker, self.config);
        })?;

        if admitted {
            Ok(())
        } else {
            Err(BcqError::CircuitOpen)
        }
    }

    /// Record a successful operation outcome.
    ///
    /// # Errors
    /// Returns a store I/O error; never returns an admission-denial error.
    pub fn record_success(&self) -> Result<()> {
        self.store.update(|state| {
            apply_stale_cleanup(&mut state.circuit_breaker, self.config);
            on_success(&mut state.circuit_breaker, self.config);
        })?;
        Ok(())
    }

    /// Record a failed operation outcome.
    ///
    /// # Errors
    /// Returns a store I/O error; never returns an admission-denial error.
    pub fn record_failure(&self) -> Result<()> {
        self.store.update(|state| {
            apply_stale_cleanup(&mut state.circuit_breaker, self.config);
            on_failure(&mut state.circuit_breaker, self.config);
        })?;
        Ok(())
    }

    /// Force the breaker back to closed with counters zeroed.
    ///
    /// # Errors
    /// Returns a store I/O error.
    pub fn reset(&self) -> Result<()> {
        self.store.update(|state| {
            state.circuit_breaker = CircuitBreakerState::default();
        })?;
        Ok(())
    }
}

/// Reclaim a stuck half-open reservation whose last attempt is older than
/// the breaker's stale-attempt timeout, so a crashed trial process can't
/// wedge the breaker open forever.
fn apply_stale_cleanup(breaker: &mut CircuitBreakerState, config: &BreakerConfig) {
    if breaker.state != BreakerPhase::HalfOpen || is_zero(breaker.half_open_last_attempt_at) {
        return;
    }
    let stale_after = chrono_duration(config.stale_attempt_timeout());
    if now() - breaker.half_open_last_attempt_at > stale_after {
        breaker.half_open_attempts = 0;
    }
}

/// Applies the admission transition and returns whether the caller is admitted.
fn decide_admission(breaker: &mut CircuitBreakerState, config: &BreakerConfig) -> bool {
    match breaker.state {
        BreakerPhase::Closed => true,
        BreakerPhase::Open => {
            let elapsed_since_open = now() - breaker.opened_at;
            if elapsed_since_open >= chrono_duration(config.open_timeout()) {
                breaker.state = BreakerPhase::HalfOpen;
                breaker.successes = 0;
                breaker.failures = 0;
                breaker.half_open_attempts = 1;
                breaker.half_open_last_attempt_at = now();
                true
            } else {
                false
            }
        }
        BreakerPhase::HalfOpen => {
            if breaker.half_open_attempts < config.half_open_max_requests {
                breaker.half_open_attempts += 1;
                breaker.half_open_last_attempt_at = now();
                true
            } else {
                false
            }
        }
    }
}

fn on_success(breaker: &mut CircuitBreakerState, config: &BreakerConfig) {
    match breaker.state {
        BreakerPhase::Closed => {
            breaker.failures = 0;
        }
        BreakerPhase::HalfOpen => {
            breaker.successes += 1;
            if breaker.successes >= config.success_threshold {
                *breaker = CircuitBreakerState::default();
            } else if breaker.half_open_attempts > 0 {
                breaker.half_open_attempts -= 1;
            }
        }
        BreakerPhase::Open => {
            // Not a reachable transition under normal admission control
            // (Allow never admits while open), so there is nothing to do.
        }
    }
}

fn on_failure(breaker: &mut CircuitBreakerState, config: &BreakerConfig) {
    breaker.last_failure_at = now();
    match breaker.state {
        BreakerPhase::Closed => {
            breaker.failures += 1;
            if breaker.failures >= config.failure_threshold {
                breaker.state = BreakerPhase::Open;
                breaker.opened_at = now();
            }
        }
        BreakerPhase::HalfOpen => {
            breaker.state = BreakerPhase::Open;
            breaker.opened_at = now();
            breaker.successes = 0;
            breaker.half_open_attempts = 0;
        }
        BreakerPhase::Open => {
            // Already open; nothing further to escalate.
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
