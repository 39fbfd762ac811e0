//! Background, single-flight refresher for the completion cache (spec.md §4.7).
//!
//! The teacher's codebase has no async runtime anywhere in its dependency
//! graph, so "background task" and "parallel fetch joined by a barrier" are
//! implemented with plain `std::thread::spawn` and `crossbeam_channel`
//! rather than `tokio`: a detached thread for the background refresh, and a
//! bounded channel standing in for the "fresh context with a 30s timeout".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::cache::model::{CachedAccount, CachedPerson, CachedProject};
use crate::cache::store::CacheStore;
use crate::core::config::CacheConfig;
use crate::core::errors::{BcqError, Result};

/// Boundary trait for fetching fresh data from the SaaS API. No concrete
/// HTTP implementation lives in this crate; the real transport is a
/// non-goal, and tests supply a mock.
pub trait Fetcher: Send + Sync {
    fn fetch_projects(&self) -> Result<Vec<CachedProject>>;
    fn fetch_people(&self) -> Result<Vec<CachedPerson>>;
    fn fetch_accounts(&self) -> Result<Vec<CachedAccount>>;
}

/// Outcome of one section's refresh attempt.
#[derive(Debug)]
pub enum SectionOutcome {
    Refreshed,
    Failed(BcqError),
}

impl SectionOutcome {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Refreshed)
    }
}

/// Report from `refresh_all`: partial failure is not itself an error.
#[derive(Debug)]
pub struct RefreshReport {
    pub projects: SectionOutcome,
    pub people: SectionOutcome,
}

/// Refresher coordinating the completion cache store and a fetcher handle.
pub struct Refresher {
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    config: CacheConfig,
    in_flight: Arc<AtomicBool>,
}

impl Refresher {
    #[must_use]
    pub fn new(store: Arc<CacheStore>, fetcher: Arc<dyn Fetcher>, config: CacheConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// If the cache is stale and no refresh is already in progress, spawn a
    /// detached background refresh and return immediately. Concurrent calls
    /// coalesce onto the same in-flight refresh (single-flight).
    pub fn refresh_if_stale(&self, max_age: Duration) {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::seconds(0));
        if !self.store.is_stale(max_age, self.config.accounts_required) {
            return;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = Duration::from_secs(self.config.background_refresh_timeout_secs);

        std::thread::spawn(move || {
            let (tx, rx) = bounded(1);
            let worker_store = Arc::clone(&store);
            let worker_fetcher = Arc::clone(&fetcher);
            std::thread::spawn(move || {
                let _ = tx.send(refresh_all_sync(&worker_store, worker_fetcher.as_ref()));
            });
            // Errors and timeouts are both swallowed: the next foreground
            // completion consults whatever cache already exists.
            let _ = rx.recv_timeout(timeout);
            in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// Fetch projects and people in parallel, persisting each section
    /// independently. Only a total failure (both sections failed) surfaces
    /// an error; partial success is reported, not raised.
    ///
    /// # Errors
    /// Returns an error only when both sections fail to fetch.
    pub fn refresh_all(&self) -> Result<RefreshReport> {
        refresh_all_sync(&self.store, self.fetcher.as_ref())
    }

    /// Synchronous, single-section refresh of `projects`.
    ///
    /// # Errors
    /// Returns the fetcher's error, or a store I/O error.
    pub fn refresh_projects(&self) -> Result<()> {
        let projects = self.fetcher.fetch_projects()?;
        self.store.update_projects(projects)?;
        Ok(())
    }

    /// Synchronous, single-section refresh of `people`.
    ///
    /// # Errors
    /// Returns the fetcher's error, or a store I/O error.
    pub fn refresh_people(&self) -> Result<()> {
        let people = self.fetcher.fetch_people()?;
        self.store.update_people(people)?;
        Ok(())
    }

    /// Synchronous, single-section refresh of `accounts`.
    ///
    /// # Errors
    /// Returns the fetcher's error, or a store I/O error.
    pub fn refresh_accounts(&self) -> Result<()> {
        let accounts = self.fetcher.fetch_accounts()?;
        self.store.update_accounts(accounts)?;
        Ok(())
    }
}

fn refresh_all_sync(store: &CacheStore, fetcher: &dyn Fetcher) -> Result<RefreshReport> {
    let (projects_tx, projects_rx) = bounded(1);
    let (people_tx, people_rx) = bounded(1);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let _ = projects_tx.send(fetcher.fetch_projects());
        });
        scope.spawn(|| {
            let _ = people_tx.send(fetcher.fetch_people());
        });
    });

    let projects_result = projects_rx
        .recv()
        .unwrap_or_else(|_| Err(BcqError::ChannelClosed { component: "cache-refresh-projects" }));
    let people_result = people_rx
        .recv()
        .unwrap_or_else(|_| Err(BcqError::ChannelClosed { component: "cache-refresh-people" }));

    let projects_outcome = match projects_result {
        Ok(projects) => match store.update_projects(projects) {
            Ok(_) => SectionOutcome::Refreshed,
            Err(e) => SectionOutcome::Failed(e),
        },
        Err(e) => SectionOutcome::Failed(e),
    };
    let people_outcome = match people_result {
        Ok(people) => match store.update_people(people) {
            Ok(_) => SectionOutcome::Refreshed,
            Err(e) => SectionOutcome::Failed(e),
        },
        Err(e) => SectionOutcome::Failed(e),
    };

    if !projects_outcome.is_ok() && !people_outcome.is_ok() {
        return Err(BcqError::Runtime {
            details: "both projects and people refresh failed".to_string(),
        });
    }

    Ok(RefreshReport {
        projects: projects_outcome,
        people: people_outcome,
    })
}
