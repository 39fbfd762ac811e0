//! Completion cache document and record types (spec.md §3/§6).
//!
//! Sections are wholly replaced on each refresh; only the replaced section's
//! timestamp moves. `updated_at` is a legacy convenience field recomputed as
//! the oldest of the three section timestamps, matching `core::timestamp::oldest`'s
//! "zero if any section is unpopulated" rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::timestamp::{oldest, zero};

pub const SCHEMA_VERSION: u32 = 1;

/// Whole completion cache document persisted as `completion.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionCache {
    pub version: u32,
    pub projects: Vec<CachedProject>,
    pub people: Vec<CachedPerson>,
    pub accounts: Vec<CachedAccount>,
    pub projects_updated_at: DateTime<Utc>,
    pub people_updated_at: DateTime<Utc>,
    pub accounts_updated_at: DateTime<Utc>,
    /// Legacy field: oldest of the three section timestamps above.
    pub updated_at: DateTime<Utc>,
}

impl Default for CompletionCache {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            projects: Vec::new(),
            people: Vec::new(),
            accounts: Vec::new(),
            projects_updated_at: zero(),
            people_updated_at: zero(),
            accounts_updated_at: zero(),
            updated_at: zero(),
        }
    }
}

impl CompletionCache {
    /// Recompute the legacy `updated_at` field from the three section timestamps.
    pub fn recompute_legacy_updated_at(&mut self) {
        self.updated_at = oldest(&[
            self.projects_updated_at,
            self.people_updated_at,
            self.accounts_updated_at,
        ]);
    }

    /// Whether the cache should be considered stale, per spec.md §4.6:
    /// missing/unreadable (handled by the caller before this is called),
    /// any *required* section timestamp zero, or the oldest required
    /// section timestamp older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: chrono::Duration, accounts_required: bool) -> bool {
        let mut required = vec![self.projects_updated_at, self.people_updated_at];
        if accounts_required {
            required.push(self.accounts_updated_at);
        }
        if required.iter().any(|ts| *ts == zero()) {
            return true;
        }
        let watermark = oldest(&required);
        crate::core::timestamp::now() - watermark > max_age
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedProject {
    pub id: i64,
    pub name: String,
    /// One of `"hq"`, `"team"`, or `""`.
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default = "crate::core::timestamp::zero")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedPerson {
    pub id: i64,
    pub name: String,
    #[serde(rename = "email_address", default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedAccount {
    pub id: i64,
    pub name: String,
}
