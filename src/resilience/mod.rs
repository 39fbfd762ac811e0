//! Resilience substrate: shared state store plus the three admission
//! primitives and the gating pipeline that coordinates them (spec.md §4).

pub mod breaker;
pub mod bulkhead;
pub mod hooks;
pub mod limiter;
pub mod state;
pub mod store;

pub use breaker::Breaker;
pub use bulkhead::Bulkhead;
pub use hooks::{Hooks, NullObserver, Outcome, RequestObserver};
pub use limiter::Limiter;
pub use state::ResilienceState;
pub use store::Store;
