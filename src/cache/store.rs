//! Completion cache store: single-process in-memory mutex plus atomic write
//! to a fixed temp sibling (spec.md §4.6).
//!
//! Unlike the resilience store, the completion cache is not meant to be
//! contended across processes at fine grain — concurrency within a process
//! is bounded by an in-memory `parking_lot::Mutex`, and the on-disk file
//! uses a single fixed `.tmp` sibling rather than a per-write unique name.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::cache::model::{CachedAccount, CachedPerson, CachedProject, CompletionCache};
use crate::core::errors::{BcqError, Result};
use crate::core::timestamp::now;

const CACHE_FILE_NAME: &str = "completion.json";

/// Completion cache store rooted at a cache directory.
pub struct CacheStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl CacheStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }

    /// Load the current cache, or an empty default if missing or corrupt.
    ///
    /// # Errors
    /// Returns an error for I/O failures other than "file not found".
    pub fn load(&self) -> Result<CompletionCache> {
        let _lock = self.guard.lock();
        self.load_unlocked()
    }

    fn load_unlocked(&self) -> Result<CompletionCache> {
        let path = self.cache_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CompletionCache::default()),
            Err(e) => return Err(BcqError::io(&path, e)),
        };
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    /// Replace the whole cache and stamp every section timestamp to now.
    ///
    /// # Errors
    /// Returns an error on I/O or serialization failure.
    pub fn save(
        &self,
        projects: Vec<CachedProject>,
        people: Vec<CachedPerson>,
        accounts: Vec<CachedAccount>,
    ) -> Result<CompletionCache> {
        let _lock = self.guard.lock();
        let ts = now();
        let mut cache = CompletionCache {
            projects,
            people,
            accounts,
            projects_updated_at: ts,
            people_updated_at: ts,
            accounts_updated_at: ts,
            ..CompletionCache::default()
        };
        cache.recompute_legacy_updated_at();
        self.write_unlocked(&cache)?;
        Ok(cache)
    }

    /// Replace the `projects` section only, stamping its timestamp and
    /// recomputing the legacy `updated_at`.
    ///
    /// # Errors
    /// Returns an error on I/O or serialization failure.
    pub fn update_projects(&self, projects: Vec<CachedProject>) -> Result<CompletionCache> {
        let _lock = self.guard.lock();
        let mut cache = self.load_unlocked()?;
        cache.projects = projects;
        cache.projects_updated_at = now();
        cache.recompute_legacy_updated_at();
        self.write_unlocked(&cache)?;
        Ok(cache)
    }

    /// Replace the `people` section only.
    ///
    /// # Errors
    /// Returns an error on I/O or serialization failure.
    pub fn update_people(&self, people: Vec<CachedPerson>) -> Result<CompletionCache> {
        let _lock = self.guard.lock();
        let mut cache = self.load_unlocked()?;
        cache.people = people;
        cache.people_updated_at = now();
        cache.recompute_legacy_updated_at();
        self.write_unlocked(&cache)?;
        Ok(cache)
    }

    /// Replace the `accounts` section only.
    ///
    /// # Errors
    /// Returns an error on I/O or serialization failure.
    pub fn update_accounts(&self, accounts: Vec<CachedAccount>) -> Result<CompletionCache> {
        let _lock = self.guard.lock();
        let mut cache = self.load_unlocked()?;
        cache.accounts = accounts;
        cache.accounts_updated_at = now();
        cache.recompute_legacy_updated_at();
        self.write_unlocked(&cache)?;
        Ok(cache)
    }

    /// Whether the cache should be treated as stale: missing/unreadable, or
    /// per [`CompletionCache::is_stale`].
    #[must_use]
    pub fn is_stale(&self, max_age: chrono::Duration, accounts_required: bool) -> bool {
        match self.load() {
            Ok(cache) => cache.is_stale(max_age, accounts_required),
            Err(_) => true,
        }
    }

    fn write_unlocked(&self, cache: &CompletionCache) -> Result<()> {
        write_atomic(&self.dir, &self.cache_path(), cache)
    }
}

/// Atomic write using a fixed `.tmp` sibling, since this store's concurrency
/// is already bounded by the in-process mutex above (unlike the resilience
/// store, which needs a unique-per-write name to guard against concurrent
/// independent processes).
fn write_atomic(dir: &Path, path: &Path, cache: &CompletionCache) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| BcqError::io(dir, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    }

    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(cache)?;

    {
        use std::io::Write as _;
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            opts.mode(0o600);
        }
        let mut file = opts.open(&tmp_path).map_err(|e| BcqError::io(&tmp_path, e))?;
        file.write_all(json.as_bytes()).map_err(|e| BcqError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| BcqError::io(&tmp_path, e))?;
    }

    #[cfg(windows)]
    {
        if path.exists() {
            fs::remove_file(path).map_err(|e| BcqError::io(path, e))?;
        }
    }

    fs::rename(&tmp_path, path).map_err(|e| BcqError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: i64, name: &str) -> CachedProject {
        CachedProject {
            id,
            name: name.to_string(),
            purpose: String::new(),
            bookmarked: false,
            updated_at: now(),
        }
    }

    #[test]
    fn load_missing_yields_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        assert_eq!(store.load().unwrap(), CompletionCache::default());
    }

    #[test]
    fn save_stamps_all_three_sections() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let cache = store.save(vec![project(1, "Launch")], vec![], vec![]).unwrap();
        assert!(!crate::core::timestamp::is_zero(cache.projects_updated_at));
        assert!(!crate::core::timestamp::is_zero(cache.people_updated_at));
        assert!(!crate::core::timestamp::is_zero(cache.accounts_updated_at));
    }

    #[test]
    fn update_projects_only_touches_its_own_section() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.save(vec![], vec![], vec![]).unwrap();
        let people_ts_before = store.load().unwrap().people_updated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.update_projects(vec![project(2, "Relaunch")]).unwrap();

        let cache = store.load().unwrap();
        assert_eq!(cache.projects.len(), 1);
        assert_eq!(cache.people_updated_at, people_ts_before);
    }

    #[test]
    fn corrupt_file_loads_as_empty_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.cache_path(), b"{not json").unwrap();
        assert_eq!(store.load().unwrap(), CompletionCache::default());
    }

    #[test]
    fn is_stale_true_for_freshly_created_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        assert!(store.is_stale(chrono::Duration::seconds(300), false));
    }

    #[test]
    fn is_stale_false_after_save_within_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        store.save(vec![], vec![], vec![]).unwrap();
        assert!(!store.is_stale(chrono::Duration::seconds(300), false));
    }
}
