#![deny(unsafe_code)]

//! bcq — command-line client for a Basecamp-shaped project-management API.
//!
//! The hardest, most reusable engineering lives in two independent cores:
//! 1. **Resilience substrate** — a circuit breaker, token-bucket rate
//!    limiter, and PID-tracking bulkhead, coordinated through a
//!    lock-protected, atomically-written state file shared across
//!    independent short-lived CLI invocations.
//! 2. **Completion cache** — a per-section JSON cache of projects, people,
//!    and accounts, with a single-flight background refresher.
//!
//! Command dispatch, the real HTTP transport, and domain commands are
//! deliberately out of scope; see `cli_app` for the thin inspection surface
//! that wires the two cores together.

pub mod cache;
pub mod core;
pub mod resilience;

#[cfg(feature = "cli")]
pub mod cli_app;
