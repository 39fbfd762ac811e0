//! Token-bucket rate limiter with server-imposed retry-after (spec.md §4.3).
//!
//! Refill is lazy: tokens accumulate only when observed, computed from the
//! elapsed time since `last_refill_at` at admission time, never on a
//! background timer. A server-imposed `Retry-After` window is monotone —
//! setting it never moves it earlier than whatever is already recorded.

use crate::core::config::LimiterConfig;
use crate::core::errors::{BcqError, Result};
use crate::core::timestamp::{is_zero, now};
use crate::resilience::state::RateLimiterState;
use crate::resilience::store::Store;

/// Token-bucket limiter bound to a store and its configured thresholds.
#[derive(Debug, Clone)]
pub struct Limiter<'a> {
    store: &'a Store,
    config: &'a LimiterConfig,
}

impl<'a> Limiter<'a> {
    #[must_use]
    pub fn new(store: &'a Store, config: &'a LimiterConfig) -> Self {
        Self { store, config }
    }

    /// Refill lazily, then admit if enough tokens are available and no
    /// server-imposed retry-after window is still in effect.
    ///
    /// # Errors
    /// Returns `BcqError::RateLimited` when denied, or a store I/O error.
    pub fn allow(&self) -> Result<()> {
        let mut denied_retry_after: Option<u64> = None;
        let state = self.store.update(|state| {
            refill(&mut state.rate_limiter, self.config);

            if !is_zero(state.rate_limiter.retry_after_until) && now() < state.rate_limiter.retry_after_until {
                denied_retry_after = Some(
                    (state.rate_limiter.retry_after_until - now())
                        .num_seconds()
                        .max(1) as u64,
                );
                return;
            }

            if state.rate_limiter.tokens >= self.config.tokens_per_request {
                state.rate_limiter.tokens -= self.config.tokens_per_request;
            } else {
                let deficit = self.config.tokens_per_request - state.rate_limiter.tokens;
                let wait_secs = if self.config.refill_rate_per_sec > 0.0 {
                    (deficit / self.config.refill_rate_per_sec).ceil().max(1.0) as u64
                } else {
                    1
                };
                denied_retry_after = Some(wait_secs);
            }
        })?;
        let _ = state;

        if let Some(retry_after_secs) = denied_retry_after {
            return Err(BcqError::RateLimited { retry_after_secs });
        }
        Ok(())
    }

    /// Current token count after a lazy refill, without consuming any.
    ///
    /// # Errors
    /// Returns a store I/O error.
    pub fn tokens(&self) -> Result<f64> {
        let state = self.store.update(|state| refill(&mut state.rate_limiter, self.config))?;
        Ok(state.rate_limiter.tokens)
    }

    /// Impose a server-given retry-after deadline. Monotone: never moves the
    /// deadline earlier than what is already recorded.
    ///
    /// # Errors
    /// Returns a store I/O error.
    pub fn set_retry_after_duration(&self, duration: std::time::Duration) -> Result<()> {
        let until = now()
            + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::seconds(0));
        self.set_retry_after(until)
    }

    /// Impose a server-given retry-after deadline as an absolute instant.
    ///
    /// # Errors
    /// Returns a store I/O error.
    pub fn set_retry_after(&self, until: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.store.update(|state| {
            if until > state.rate_limiter.retry_after_until {
                state.rate_limiter.retry_after_until = until;
            }
        })?;
        Ok(())
    }

    /// Reset to a full bucket with no retry-after window.
    ///
    /// # Errors
    /// Returns a store I/O error.
    pub fn reset(&self) -> Result<()> {
        self.store.update(|state| {
            state.rate_limiter = RateLimiterState {
                tokens: self.config.max_tokens,
                last_refill_at: now(),
                retry_after_until: crate::core::timestamp::zero(),
            };
        })?;
        Ok(())
    }
}

fn refill(limiter: &mut RateLimiterState, config: &LimiterConfig) {
    if is_zero(limiter.last_refill_at) {
        limiter.tokens = config.max_tokens;
        limiter.last_refill_at = now();
        return;
    }
    let elapsed = (now() - limiter.last_refill_at).num_milliseconds().max(0) as f64 / 1000.0;
    let refilled = limiter.tokens + elapsed * config.refill_rate_per_sec;
    limiter.tokens = refilled.min(config.max_tokens);
    limiter.last_refill_at = now();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_config() -> LimiterConfig {
        LimiterConfig {
            max_tokens: 3.0,
            refill_rate_per_sec: 1.0,
            tokens_per_request: 1.0,
        }
    }

    #[test]
    fn fresh_bucket_starts_full_and_admits_up_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let cfg = limiter_config();
        let limiter = Limiter::new(&store, &cfg);

        limiter.allow().unwrap();
        limiter.allow().unwrap();
        limiter.allow().unwrap();
        let err = limiter.allow().unwrap_err();
        assert!(matches!(err, BcqError::RateLimited { .. }));
    }

    #[test]
    fn retry_after_denies_until_it_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let cfg = limiter_config();
        let limiter = Limiter::new(&store, &cfg);

        limiter
            .set_retry_after_duration(std::time::Duration::from_secs(3600))
            .unwrap();
        let err = limiter.allow().unwrap_err();
        assert!(matches!(err, BcqError::RateLimited { .. }));
    }

    #[test]
    fn retry_after_is_monotone_and_never_moves_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let cfg = limiter_config();
        let limiter = Limiter::new(&store, &cfg);

        limiter
            .set_retry_after_duration(std::time::Duration::from_secs(3600))
            .unwrap();
        let far_future = store.load().unwrap().rate_limiter.retry_after_until;

        limiter
            .set_retry_after_duration(std::time::Duration::from_secs(1))
            .unwrap();
        let after_shorter_call = store.load().unwrap().rate_limiter.retry_after_until;

        assert_eq!(far_future, after_shorter_call);
    }

    #[test]
    fn reset_restores_full_bucket_and_clears_retry_after() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let cfg = limiter_config();
        let limiter = Limiter::new(&store, &cfg);

        limiter.allow().unwrap();
        limiter
            .set_retry_after_duration(std::time::Duration::from_secs(3600))
            .unwrap();
        limiter.reset().unwrap();

        let state = store.load().unwrap();
        assert!((state.rate_limiter.tokens - cfg.max_tokens).abs() < f64::EPSILON);
        assert!(crate::core::timestamp::is_zero(
            state.rate_limiter.retry_after_until
        ));
    }
}
