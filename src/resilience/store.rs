//! Shared, lock-protected, atomically-written state store (spec.md §4.1).
//!
//! Multiple independent CLI processes read and mutate `state.json` under a
//! directory they all agree on. The locking protocol tries for an exclusive
//! advisory lock on a sibling `.lock` file with a hard 100 ms deadline,
//! polling every 10 ms (mirroring the pack's `try_lock_exclusive_with_timeout`
//! helper), and proceeds lock-free ("fail open") if the deadline elapses —
//! a short-lived CLI must never hang because another process crashed holding
//! the lock.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::errors::{BcqError, Result};
use crate::core::timestamp::now;
use crate::resilience::state::ResilienceState;

/// Hard deadline for lock acquisition (spec.md §4.1).
const LOCK_DEADLINE: Duration = Duration::from_millis(100);
/// Poll interval while waiting for the lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

const STATE_FILE_NAME: &str = "state.json";
const LOCK_FILE_NAME: &str = ".lock";

/// A shared state store rooted at a directory containing `state.json` and `.lock`.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Create a store rooted at `dir`. Does not touch the filesystem.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }

    /// Non-locking existence check.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Load the current document, or a fresh default if absent or corrupt.
    ///
    /// # Errors
    /// Returns an error only for I/O failures other than "file not found"
    /// (e.g. permission denied); a corrupt document is treated as absent.
    pub fn load(&self) -> Result<ResilienceState> {
        let path = self.state_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ResilienceState::default()),
            Err(e) => return Err(BcqError::io(&path, e)),
        };
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    /// Serialize and atomically replace the state file.
    ///
    /// # Errors
    /// Returns an error on any I/O or serialization failure.
    pub fn save(&self, state: &ResilienceState) -> Result<()> {
        write_atomic(&self.dir, &self.state_path(), state)
    }

    /// Delete the state file. Idempotent.
    ///
    /// # Errors
    /// Returns an error for I/O failures other than "file not found".
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(self.state_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BcqError::io(self.state_path(), e)),
        }
    }

    /// Load, apply `mutate` in place, stamp `updated_at`, and save — all
    /// under a single lock acquisition (or fail-open if the lock times out).
    ///
    /// # Errors
    /// Returns an error only for non-lock-timeout I/O failures.
    pub fn update<F>(&self, mutate: F) -> Result<ResilienceState>
    where
        F: FnOnce(&mut ResilienceState),
    {
        fs::create_dir_all(&self.dir).map_err(|e| BcqError::io(&self.dir, e))?;
        let _guard = acquire_lock(&self.lock_path())?;

        let mut state = self.load()?;
        mutate(&mut state);
        state.updated_at = now();
        self.save(&state)?;
        Ok(state)
    }
}

/// RAII guard over an advisory file lock. `None` means the lock was not
/// held (fail-open after the deadline elapsed); dropping always unlocks.
struct LockGuard(Option<File>);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.0 {
            let _ = file.unlock();
        }
    }
}

fn acquire_lock(lock_path: &Path) -> Result<LockGuard> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| BcqError::io(parent, e))?;
    }
    let file = open_lock_file(lock_path)?;

    let start = Instant::now();
    loop {
        match file.try_lock() {
            Ok(()) => return Ok(LockGuard(Some(file))),
            Err(TryLockError::WouldBlock) => {
                if start.elapsed() >= LOCK_DEADLINE {
                    // Fail open: proceed without the lock.
                    return Ok(LockGuard(None));
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(TryLockError::Error(e)) => return Err(BcqError::io(lock_path, e)),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        opts.mode(0o600);
    }
    opts.open(lock_path).map_err(|e| BcqError::io(lock_path, e))
}

/// Write `value` to a per-write unique temp sibling, then rename over `path`.
///
/// On Unix, `rename` atomically replaces an existing target. On Windows the
/// target must be removed first; this leaves a narrow window where a
/// concurrent reader could observe "absent" and fall back to a default
/// document, which is acceptable under this store's fail-open design.
fn write_atomic<T: serde::Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| BcqError::io(dir, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    }

    let pid = std::process::id();
    let nanos = now().timestamp_nanos_opt().unwrap_or_default();
    let tmp_path = dir.join(format!("{}.{pid}.{nanos}.tmp", path_file_name(path)));

    let json = serde_json::to_string_pretty(value)?;
    write_with_mode(&tmp_path, &json)?;

    #[cfg(windows)]
    {
        if path.exists() {
            fs::remove_file(path).map_err(|e| BcqError::io(path, e))?;
        }
    }

    let result = fs::rename(&tmp_path, path);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.map_err(|e| BcqError::io(path, e))
}

fn path_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".to_string())
}

fn write_with_mode(tmp_path: &Path, json: &str) -> Result<()> {
    use std::io::Write as _;
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt as _;
        opts.mode(0o600);
    }
    let mut file = opts.open(tmp_path).map_err(|e| BcqError::io(tmp_path, e))?;
    file.write_all(json.as_bytes())
        .map_err(|e| BcqError::io(tmp_path, e))?;
    file.sync_all().map_err(|e| BcqError::io(tmp_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let state = store.load().unwrap();
        assert_eq!(state, ResilienceState::default());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut state = ResilienceState::default();
        state.circuit_breaker.failures = 3;
        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.circuit_breaker.failures, 3);
    }

    #[test]
    fn corrupt_file_is_treated_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.state_path(), b"not json at all {{{").unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, ResilienceState::default());
    }

    #[test]
    fn update_applies_mutation_and_stamps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let result = store
            .update(|s| {
                s.circuit_breaker.failures = 7;
            })
            .unwrap();
        assert_eq!(result.circuit_breaker.failures, 7);
        assert!(result.updated_at > crate::core::timestamp::zero());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.circuit_breaker.failures, 7);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.clear().unwrap();
        store.save(&ResilienceState::default()).unwrap();
        assert!(store.exists());
        store.clear().unwrap();
        assert!(!store.exists());
        store.clear().unwrap();
    }

    #[test]
    fn concurrent_updates_from_two_threads_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save(&ResilienceState::default()).unwrap();

        let store_a = store.clone();
        let store_b = store.clone();
        let handle_a = thread::spawn(move || {
            for _ in 0..20 {
                store_a
                    .update(|s| s.circuit_breaker.failures += 1)
                    .unwrap();
            }
        });
        let handle_b = thread::spawn(move || {
            for _ in 0..20 {
                store_b
                    .update(|s| s.circuit_breaker.successes += 1)
                    .unwrap();
            }
        });
        handle_a.join().unwrap();
        handle_b.join().unwrap();

        let final_state = store.load().unwrap();
        assert_eq!(final_state.circuit_breaker.failures, 20);
        assert_eq!(final_state.circuit_breaker.successes, 20);
    }

    #[test]
    fn crash_mid_save_leaves_prior_document_intact() {
        // Simulate a crash between temp-write and rename: the renamed-over
        // path never existed, so Load must still see the prior valid
        // document written in the first Save.
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut first = ResilienceState::default();
        first.circuit_breaker.failures = 1;
        store.save(&first).unwrap();

        // Leave a stray temp file around, as a crashed writer would.
        let stray = dir.path().join("state.json.99999.123.tmp");
        fs::write(&stray, b"{\"circuit_breaker\":{\"failures\":999}}").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.circuit_breaker.failures, 1);
    }
}
