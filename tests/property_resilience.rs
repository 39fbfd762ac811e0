//! Property-based tests for the resilience substrate's core invariants.

use bcq::core::config::{BreakerConfig, BulkheadConfig, LimiterConfig};
use bcq::resilience::{Breaker, Bulkhead, Limiter, Store};
use proptest::prelude::*;

fn limiter_config() -> LimiterConfig {
    LimiterConfig {
        max_tokens: 20.0,
        refill_rate_per_sec: 5.0,
        tokens_per_request: 1.0,
    }
}

fn breaker_config() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 4,
        success_threshold: 2,
        open_timeout_secs: 3600,
        half_open_max_requests: 2,
        stale_attempt_timeout_secs: Some(7200),
    }
}

proptest! {
    /// Invariant 1 (spec.md §3): tokens stay within [0, MaxTokens] after any
    /// sequence of Allow calls.
    #[test]
    fn tokens_stay_within_bounds(calls in 0usize..200) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let cfg = limiter_config();
        let limiter = Limiter::new(&store, &cfg);

        for _ in 0..calls {
            let _ = limiter.allow();
        }

        let tokens = limiter.tokens().unwrap();
        prop_assert!(tokens >= 0.0);
        prop_assert!(tokens <= cfg.max_tokens);
    }

    /// Invariant 2: after dead-PID reclamation, active permits never exceed
    /// MaxConcurrent under ordinary (non-reduced-config) operation.
    #[test]
    fn bulkhead_never_exceeds_capacity_for_distinct_live_pids(max_concurrent in 1usize..8) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let cfg = BulkheadConfig { max_concurrent };
        let bulkhead = Bulkhead::new(&store, &cfg);

        let mut acquired = 0usize;
        for i in 0..(max_concurrent * 2) {
            let pid = std::process::id().wrapping_add(i as u32 + 1);
            if bulkhead.acquire_for(pid).is_ok() {
                acquired += 1;
            }
        }

        prop_assert!(acquired <= max_concurrent);
        prop_assert!(bulkhead.available().unwrap() <= max_concurrent);
    }

    /// Invariant 3: in half-open, attempts never exceed HalfOpenMaxRequests.
    #[test]
    fn half_open_attempts_never_exceed_configured_max(extra_allow_calls in 0usize..10) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cfg = breaker_config();
        cfg.open_timeout_secs = 0; // trip straight into half-open on next Allow
        let breaker = Breaker::new(&store, &cfg);

        for _ in 0..cfg.failure_threshold {
            breaker.record_failure().unwrap();
        }
        for _ in 0..extra_allow_calls {
            let _ = breaker.allow();
        }

        let state = store.load().unwrap();
        prop_assert!(state.circuit_breaker.half_open_attempts <= cfg.half_open_max_requests);
    }

    /// Invariant 4: RecordSuccess/RecordFailure in half-open decrement
    /// half_open_attempts by at most one, with a floor of zero.
    #[test]
    fn half_open_attempts_never_underflow(success_calls in 0usize..6) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut cfg = breaker_config();
        cfg.open_timeout_secs = 0;
        cfg.success_threshold = 1_000; // never close, so attempts can only decrement
        let breaker = Breaker::new(&store, &cfg);

        for _ in 0..cfg.failure_threshold {
            breaker.record_failure().unwrap();
        }
        breaker.allow().unwrap();

        for _ in 0..success_calls {
            breaker.record_success().unwrap();
            let state = store.load().unwrap();
            prop_assert!(state.circuit_breaker.half_open_attempts <= cfg.half_open_max_requests);
        }
    }
}
