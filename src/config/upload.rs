//! Upload directive configuration

use super::defaults::DEFAULT_RENAME_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One upload directive: what to upload, where, and how
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// File path, directory or glob pattern
    pub source: String,

    /// Directory the source is resolved against (default: process cwd)
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Remote path prefix, or the remote file name for single files
    #[serde(default)]
    pub target: String,

    /// Replace file names with random ones
    #[serde(default)]
    pub rename: Rename,

    /// Drop the relative directory structure
    #[serde(default)]
    pub flat: bool,

    /// Show a progress bar instead of per-file lines
    #[serde(default)]
    pub show_progress: bool,

    /// Resolve and report without transferring anything
    #[serde(default)]
    pub dry_run: bool,

    /// Glob patterns (relative to `cwd`) of files to leave out
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Purge the CDN cache for uploaded URLs
    #[serde(default)]
    pub cdn_purge_cache: CdnCacheOption<PurgeOverrides>,

    /// Pre-warm the CDN cache for uploaded URLs
    #[serde(default)]
    pub cdn_push_cache: CdnCacheOption<PushOverrides>,
}

impl UploadConfig {
    /// Directive for a single source with everything else defaulted
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Target with any leading slash removed; remote keys are never absolute
    #[must_use]
    pub fn normalized_target(&self) -> &str {
        self.target.trim_start_matches('/')
    }
}

/// `rename = true` or `rename = <length>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rename {
    /// On with the default length, or off
    Enabled(bool),
    /// On with an explicit stem length
    Length(usize),
}

impl Default for Rename {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl Rename {
    /// Stem length to generate, `None` when renaming is off
    #[must_use]
    pub const fn length(self) -> Option<usize> {
        match self {
            Self::Enabled(true) => Some(DEFAULT_RENAME_LENGTH),
            Self::Length(0) | Self::Enabled(false) => None,
            Self::Length(length) => Some(length),
        }
    }
}

/// `cdn_*_cache = true` or a table of request overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CdnCacheOption<T> {
    /// On with provider defaults, or off
    Enabled(bool),
    /// On with request overrides
    Custom(T),
}

impl<T> Default for CdnCacheOption<T> {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl<T> CdnCacheOption<T> {
    /// Whether the operation should run
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(true) | Self::Custom(_))
    }

    /// Caller-supplied request fields
    #[must_use]
    pub const fn overrides(&self) -> Option<&T> {
        match self {
            Self::Custom(overrides) => Some(overrides),
            Self::Enabled(_) => None,
        }
    }
}

/// Extra `PurgeUrlsCache` request fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOverrides {
    /// `mainland`, `overseas` or `global`
    #[serde(default)]
    pub area: Option<String>,
    /// Encode Chinese characters in URLs before purging
    #[serde(default)]
    pub url_encode: Option<bool>,
}

/// Extra `PushUrlsCache` request fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOverrides {
    /// User-Agent sent with warm-up requests
    #[serde(default)]
    pub user_agent: Option<String>,
    /// `mainland`, `overseas` or `global`
    #[serde(default)]
    pub area: Option<String>,
    /// `middle` to warm the middle layer only
    #[serde(default)]
    pub layer: Option<String>,
    /// Also warm the segments referenced by m3u8 playlists
    #[serde(default)]
    pub parse_m3u8: Option<bool>,
    /// Disable range requests while warming
    #[serde(default)]
    pub disable_range: Option<bool>,
    /// Encode Chinese characters in URLs before pushing
    #[serde(default)]
    pub url_encode: Option<bool>,
}
