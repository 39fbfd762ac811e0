//! Gating hooks pipeline around outbound operations (spec.md §4.5).
//!
//! Admission order is fixed: rate limiter, then bulkhead, then circuit
//! breaker. Each primitive that reserved something on the way in (currently
//! only the bulkhead) must be released on the way out regardless of the
//! operation's outcome, which is why `OperationGuard` carries that state
//! rather than each caller tracking it by hand.

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::resilience::bulkhead::Bulkhead;
use crate::resilience::breaker::Breaker;
use crate::resilience::limiter::Limiter;
use crate::resilience::store::Store;

/// Outcome of an outbound operation, as reported to `on_operation_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A client error (4xx other than 429): does not count against the breaker.
    ClientError,
    /// A server error (5xx) or transport failure: counts against the breaker.
    ServerError,
    /// The server asked the caller to back off; `retry_after` is forwarded
    /// to the rate limiter verbatim.
    RateLimited {
        retry_after: std::time::Duration,
    },
}

/// Bookkeeping returned by `gate`, threaded back into `end` so release calls
/// are symmetric with whatever was reserved at admission time.
#[derive(Debug)]
pub struct OperationGuard {
    bulkhead_held: bool,
}

/// Coordinates the three resilience primitives around a single store.
pub struct Hooks {
    store: Store,
    config: Config,
}

impl Hooks {
    #[must_use]
    pub fn new(store: Store, config: Config) -> Self {
        Self { store, config }
    }

    /// Run the admission pipeline: limiter, then bulkhead, then breaker.
    /// On denial, any resource already reserved earlier in the pipeline is
    /// released before returning the error.
    ///
    /// # Errors
    /// Returns the first admission-denial or store error encountered.
    pub fn gate(&self) -> Result<OperationGuard> {
        let limiter = Limiter::new(&self.store, &self.config.limiter);
        limiter.allow()?;

        let bulkhead = Bulkhead::new(&self.store, &self.config.bulkhead);
        bulkhead.acquire()?;

        let breaker = Breaker::new(&self.store, &self.config.breaker);
        if let Err(e) = breaker.allow() {
            bulkhead.release()?;
            return Err(e);
        }

        Ok(OperationGuard { bulkhead_held: true })
    }

    /// Report the outcome of an operation admitted by `gate`, releasing any
    /// reserved resources and recording the result against the breaker and
    /// limiter as appropriate.
    ///
    /// # Errors
    /// Returns a store I/O error.
    pub fn end(&self, mut guard: OperationGuard, outcome: Outcome) -> Result<()> {
        let breaker = Breaker::new(&self.store, &self.config.breaker);
        let limiter = Limiter::new(&self.store, &self.config.limiter);

        match outcome {
            Outcome::Success => breaker.record_success()?,
            Outcome::ClientError => {
                // Client errors are not the dependency's fault; leave the
                // breaker's counters untouched.
            }
            Outcome::ServerError => breaker.record_failure()?,
            Outcome::RateLimited { retry_after } => {
                limiter.set_retry_after_duration(retry_after)?;
            }
        }

        if guard.bulkhead_held {
            let bulkhead = Bulkhead::new(&self.store, &self.config.bulkhead);
            bulkhead.release()?;
            guard.bulkhead_held = false;
        }
        Ok(())
    }
}

/// Observer trait for the surrounding HTTP/request layer to report into.
/// Methods default to no-ops; implementors override only the hooks they
/// need, mirroring the permissive-trait idiom used at the store boundary.
pub trait RequestObserver {
    fn on_request_start(&self) {}
    fn on_operation_gate(&self) {}
    fn on_operation_start(&self) {}
    fn on_operation_end(&self, _outcome: Outcome) {}
    fn on_retry(&self, _attempt: u32) {}
}

/// A `RequestObserver` that does nothing, used where no caller supplies one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RequestObserver for NullObserver {}
