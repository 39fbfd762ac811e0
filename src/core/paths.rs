//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Try filesystem resolution first (handles symlinks).
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    // Fallback: syntactic normalization.
    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Directory name used under a cache root for resilience state and completion cache.
const APP_DIR_NAME: &str = "bcq";

/// Resolve the directory holding the resilience state store (`state.json`).
///
/// `explicit` takes precedence (an explicit `--state-dir` flag or in-process
/// override). Otherwise falls back to [`resolve_cache_dir`] plus a
/// `resilience` subdirectory, matching spec.md §6's default
/// `(platform cache dir)/bcq/resilience/state.json`.
#[must_use]
pub fn resolve_resilience_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return resolve_absolute_path(path);
    }
    resolve_cache_dir(None).join("resilience")
}

/// Resolve the completion cache directory.
///
/// Precedence (spec.md §4.6/§6): explicit flag/context override, then
/// `BCQ_CACHE_DIR`, then `BASECAMP_CACHE_DIR`, then `XDG_CACHE_HOME`, then a
/// platform home-cache fallback (`~/.cache` on Unix, `~/Library/Caches` on
/// macOS is not distinguished here since this crate targets Unix/Windows).
#[must_use]
pub fn resolve_cache_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return resolve_absolute_path(path).join(APP_DIR_NAME);
    }
    if let Some(dir) = env_path("BCQ_CACHE_DIR") {
        return resolve_absolute_path(&dir).join(APP_DIR_NAME);
    }
    if let Some(dir) = env_path("BASECAMP_CACHE_DIR") {
        return resolve_absolute_path(&dir).join(APP_DIR_NAME);
    }
    if let Some(dir) = env_path("XDG_CACHE_HOME") {
        return resolve_absolute_path(&dir).join(APP_DIR_NAME);
    }
    home_cache_fallback().join(APP_DIR_NAME)
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(unix)]
fn home_cache_fallback() -> PathBuf {
    env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".cache"))
        .unwrap_or_else(|| PathBuf::from(".cache"))
}

#[cfg(windows)]
fn home_cache_fallback() -> PathBuf {
    env::var_os("LOCALAPPDATA")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
