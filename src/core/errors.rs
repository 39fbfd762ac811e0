//! BCQ-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, BcqError>;

/// Top-level error type for the Basecamp CLI resilience substrate.
#[derive(Debug, Error)]
pub enum BcqError {
    #[error("[BCQ-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[BCQ-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[BCQ-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[BCQ-2001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[BCQ-2101] circuit breaker is open")]
    CircuitOpen,

    #[error("[BCQ-2102] rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("[BCQ-2103] bulkhead is full ({active}/{max} permits held)")]
    BulkheadFull { active: usize, max: usize },

    #[error("[BCQ-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[BCQ-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BCQ-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[BCQ-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl BcqError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "BCQ-1001",
            Self::MissingConfig { .. } => "BCQ-1002",
            Self::ConfigParse { .. } => "BCQ-1003",
            Self::Serialization { .. } => "BCQ-2001",
            Self::CircuitOpen => "BCQ-2101",
            Self::RateLimited { .. } => "BCQ-2102",
            Self::BulkheadFull { .. } => "BCQ-2103",
            Self::PermissionDenied { .. } => "BCQ-3001",
            Self::Io { .. } => "BCQ-3002",
            Self::ChannelClosed { .. } => "BCQ-3003",
            Self::Runtime { .. } => "BCQ-3900",
        }
    }

    /// Whether this is one of the three typed admission-denial variants
    /// primitives surface to callers (spec.md §7, "Operation denied").
    #[must_use]
    pub const fn is_admission_denial(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen | Self::RateLimited { .. } | Self::BulkheadFull { .. }
        )
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for BcqError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for BcqError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
