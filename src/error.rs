//! Error types and handling for coscmd
//!
//! [`CliError`] covers everything that stops a command, an upload directive
//! or a cache-sync step. Per-file transfer failures are deliberately not part
//! of it: they are recorded as [`TransferError`] inside the upload result and
//! never abort a batch.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for coscmd operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that abort a command, a directive or a cache-sync step
#[derive(Error, Debug)]
pub enum CliError {
    // ═══════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════
    /// Failed to read configuration file
    #[error("Failed to read config from {path}: {reason}")]
    ConfigRead { path: PathBuf, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No enabled storage client
    #[error("No enabled COS client. Add one to \"cos.config.toml\" first")]
    NoClients,

    /// Neither a source argument nor an upload section
    #[error("Missing upload configuration: pass a source or add an [[upload]] section")]
    MissingUpload,

    // ═══════════════════════════════════════════════════════════════
    // Source Resolution Errors
    // ═══════════════════════════════════════════════════════════════
    /// Source exists but is neither a file nor a directory
    #[error("Unsupported source file type: {path}")]
    UnsupportedSource { path: PathBuf },

    /// Source or ignore glob could not be parsed
    #[error("Invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A glob match could not be read
    #[error("Glob expansion failed at {path}: {reason}")]
    Glob { path: PathBuf, reason: String },

    /// Directory enumeration failed
    #[error("Directory walk failed at {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    /// File operation failed
    #[error("File operation failed: {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    // ═══════════════════════════════════════════════════════════════
    // Provider Errors
    // ═══════════════════════════════════════════════════════════════
    /// The storage client could not be built
    #[error("Storage client error: {0}")]
    Storage(String),

    /// A cache purge or push call failed
    #[error("CDN {operation} failed on chunk {chunk} ({urls} urls): {reason}")]
    CacheSync {
        operation: CacheOperation,
        chunk: usize,
        urls: usize,
        reason: String,
    },
}

/// The two CDN cache operations run after an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperation {
    /// Invalidate edge caches
    Purge,
    /// Pre-warm edge caches
    Push,
}

impl std::fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Purge => f.write_str("cache purge"),
            Self::Push => f.write_str("cache push"),
        }
    }
}

impl CliError {
    /// Get the exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigRead { .. } | Self::InvalidConfig(_) | Self::NoClients | Self::MissingUpload => 2,
            Self::UnsupportedSource { .. }
            | Self::InvalidPattern { .. }
            | Self::Glob { .. }
            | Self::Walk { .. }
            | Self::Io { .. } => 3,
            Self::CacheSync { .. } => 6,
            Self::Storage(_) => 1,
        }
    }

    /// Whether the error stops the whole invocation rather than one directive
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigRead { .. } | Self::InvalidConfig(_) | Self::NoClients | Self::MissingUpload
        )
    }

    /// Whether the error only affects the directive that raised it
    pub const fn is_directive_local(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSource { .. }
                | Self::InvalidPattern { .. }
                | Self::Glob { .. }
                | Self::Walk { .. }
                | Self::Io { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// A single file's transfer failure, kept in its outcome
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Local file could not be read
    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// Request never got a response
    #[error("Request failed: {0}")]
    Network(String),

    /// Non-success response from the service
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response was missing something the protocol requires
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The provider gave up on the whole batch before reporting this file
    #[error("Batch aborted: {0}")]
    Batch(String),
}
