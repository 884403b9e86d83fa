//! Key mapping: turn one source argument into local files and remote keys
//!
//! A source is classified in this order, first match wins:
//!
//! 1. an existing regular file,
//! 2. an existing directory, enumerated recursively,
//! 3. anything else, expanded as a glob pattern against `cwd`.
//!
//! Remote keys always use `/`, never start with one, and are computed from
//! the path before renaming so that only the file stem ever changes.

use crate::config::UploadConfig;
use crate::error::{CliError, Result};
use crate::prefix::longest_common_prefix;
use glob::{MatchOptions, Pattern};
use rand::Rng;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use walkdir::WalkDir;

const RENAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// Dotfiles are matched like any other file; `*` stays within one segment.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A local file paired with the key it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFile {
    /// Path relative to `cwd`, for display
    pub relative_path: String,
    /// Absolute local path
    pub full_path: PathBuf,
    /// Object key in the bucket
    pub remote_key: String,
}

/// Resolves a directive's source into [`ResolvedFile`]s
#[derive(Debug, Clone)]
pub struct KeyMapper {
    cwd: PathBuf,
    target: String,
    rename: Option<usize>,
    flat: bool,
    ignore: Vec<Pattern>,
}

impl KeyMapper {
    /// Build a mapper from a directive; a relative `cwd` is taken from the process cwd
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let process_cwd = std::env::current_dir().map_err(|e| CliError::io(".", &e))?;
        let cwd = match &config.cwd {
            Some(cwd) => normalize(&process_cwd.join(cwd)),
            None => process_cwd,
        };
        let ignore = config
            .ignore
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| CliError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cwd,
            target: config.normalized_target().to_string(),
            rename: config.rename.length(),
            flat: config.flat,
            ignore,
        })
    }

    /// Working directory sources are resolved against
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolve a source into files, in a stable order
    pub fn resolve(&self, source: &str) -> Result<Vec<ResolvedFile>> {
        let source_path = normalize(&self.cwd.join(source));
        let files = match fs::metadata(&source_path) {
            Ok(meta) if meta.is_file() => {
                tracing::debug!(source, "source is a file");
                self.single_file(&source_path)
            }
            Ok(meta) if meta.is_dir() => {
                tracing::debug!(source, "source is a directory");
                self.directory(&source_path)?
            }
            Ok(_) => {
                tracing::debug!(source, "source type not supported");
                return Err(CliError::UnsupportedSource { path: source_path });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(source, "using source as a glob pattern");
                self.glob(source)?
            }
            Err(e) => return Err(CliError::io(source_path, &e)),
        };
        tracing::debug!(source, count = files.len(), "source resolved");
        Ok(files)
    }

    fn single_file(&self, full_path: &Path) -> Vec<ResolvedFile> {
        if self.is_ignored(full_path) {
            return Vec::new();
        }
        // Heuristic: a target with the source's extension names the file itself.
        let names_file =
            !self.target.is_empty() && extension_of(Path::new(&self.target)) == extension_of(full_path);
        let remote_key = if names_file {
            self.target.clone()
        } else {
            join_key(&self.target, &self.file_name(full_path))
        };
        vec![self.resolved(full_path, remote_key)]
    }

    fn directory(&self, dir: &Path) -> Result<Vec<ResolvedFile>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| CliError::Walk {
                path: e.path().unwrap_or(dir).to_path_buf(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if entry.file_type().is_dir() || !path.is_file() || self.is_ignored(path) {
                continue;
            }
            files.push(self.nested(dir, path));
        }
        Ok(files)
    }

    fn glob(&self, source: &str) -> Result<Vec<ResolvedFile>> {
        let pattern = if Path::new(source).is_absolute() {
            source.to_string()
        } else {
            let source = source.trim_start_matches("./");
            let cwd = Pattern::escape(&self.cwd.to_string_lossy());
            format!("{}/{source}", cwd.trim_end_matches(MAIN_SEPARATOR))
        };
        let matches = glob::glob_with(&pattern, MATCH_OPTIONS).map_err(|e| {
            CliError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut full_paths = Vec::new();
        for matched in matches {
            let path = matched.map_err(|e| CliError::Glob {
                path: e.path().to_path_buf(),
                reason: e.error().to_string(),
            })?;
            let path = normalize(&path);
            if path.is_file() && !self.is_ignored(&path) {
                full_paths.push(path);
            }
        }
        if full_paths.is_empty() {
            return Ok(Vec::new());
        }

        let base = common_base(&full_paths);
        Ok(full_paths
            .iter()
            .map(|full_path| self.nested(&base, full_path))
            .collect())
    }

    /// Key for a file below `base`, keeping its relative directories unless flat
    fn nested(&self, base: &Path, full_path: &Path) -> ResolvedFile {
        let name = self.file_name(full_path);
        let remote_key = if self.flat {
            join_key(&self.target, &name)
        } else {
            let parent = full_path
                .strip_prefix(base)
                .ok()
                .and_then(Path::parent)
                .map(to_key)
                .unwrap_or_default();
            join_key(&self.target, &join_key(&parent, &name))
        };
        self.resolved(full_path, remote_key)
    }

    fn resolved(&self, full_path: &Path, remote_key: String) -> ResolvedFile {
        ResolvedFile {
            relative_path: relative_path(&self.cwd, full_path)
                .to_string_lossy()
                .into_owned(),
            full_path: full_path.to_path_buf(),
            remote_key,
        }
    }

    /// File name, with the stem replaced when renaming
    fn file_name(&self, path: &Path) -> String {
        match self.rename {
            Some(length) => format!("{}{}", random_stem(length), extension_of(path)),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignore.is_empty() {
            return false;
        }
        let relative = to_key(&relative_path(&self.cwd, path));
        self.ignore
            .iter()
            .any(|pattern| pattern.matches_with(&relative, MATCH_OPTIONS))
    }
}

/// Resolve a directive's source on the blocking pool
pub async fn resolve(config: &UploadConfig) -> Result<Vec<ResolvedFile>> {
    let mapper = KeyMapper::new(config)?;
    let source = config.source.clone();
    tokio::task::spawn_blocking(move || mapper.resolve(&source))
        .await
        .map_err(|e| CliError::Io {
            path: PathBuf::from(&config.source),
            reason: format!("resolver task failed: {e}"),
        })?
}

/// Random stem of lowercase letters and digits
#[must_use]
pub fn random_stem(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(RENAME_ALPHABET[rng.gen_range(0..RENAME_ALPHABET.len())]))
        .collect()
}

/// Directory every matched path lives under
///
/// The common prefix either already ends at a separator or stops inside a
/// name, in which case its parent is the boundary.
fn common_base(full_paths: &[PathBuf]) -> PathBuf {
    let strings: Vec<String> = full_paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let prefix = longest_common_prefix(&strings);
    if prefix.ends_with(MAIN_SEPARATOR) {
        PathBuf::from(prefix)
    } else {
        Path::new(&prefix)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// `.ext` including the dot, or empty
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Join key segments, resolving `.`/`..` and dropping empty segments
fn join_key(prefix: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in prefix.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                let _ = segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Path components joined with `/`
fn to_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// `path` relative to `base`, climbing with `..` where needed
fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = path.components().collect();
    let shared = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base.len() {
        relative.push("..");
    }
    for component in &target[shared..] {
        relative.push(component.as_os_str());
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rename;
    use std::collections::HashSet;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative).unwrap();
    }

    fn config(cwd: &Path, source: &str, target: &str) -> UploadConfig {
        UploadConfig {
            cwd: Some(cwd.to_path_buf()),
            target: target.to_string(),
            ..UploadConfig::new(source)
        }
    }

    fn keys(config: &UploadConfig) -> Vec<String> {
        let mapper = KeyMapper::new(config).unwrap();
        let mut keys: Vec<String> = mapper
            .resolve(&config.source)
            .unwrap()
            .into_iter()
            .map(|f| f.remote_key)
            .collect();
        keys.sort();
        keys
    }

    fn docs_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "docs/a/x.md");
        touch(dir.path(), "docs/b/y.md");
        dir
    }

    #[test]
    fn test_single_file_target_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/b.txt");
        let config = config(dir.path(), "./a/b.txt", "out/renamed.txt");
        assert_eq!(keys(&config), vec!["out/renamed.txt"]);
    }

    #[test]
    fn test_single_file_target_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/b.txt");
        let config = config(dir.path(), "a/b.txt", "/static/v1");
        assert_eq!(keys(&config), vec!["static/v1/b.txt"]);
    }

    #[test]
    fn test_single_file_without_target() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Makefile");
        let config = config(dir.path(), "Makefile", "");
        assert_eq!(keys(&config), vec!["Makefile"]);
    }

    #[test]
    fn test_single_file_dotted_directory_target_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "file");
        // "v1.2/file" has no extension, like the source, so it names the file
        let config = config(dir.path(), "file", "v1.2/file");
        assert_eq!(keys(&config), vec!["v1.2/file"]);
    }

    #[test]
    fn test_single_file_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/b.txt");
        let config = config(dir.path(), "a/b.txt", "");
        let files = KeyMapper::new(&config).unwrap().resolve("a/b.txt").unwrap();
        assert_eq!(files[0].relative_path, format!("a{MAIN_SEPARATOR}b.txt"));
        assert!(files[0].full_path.is_absolute());
    }

    #[test]
    fn test_directory_keeps_structure() {
        let dir = docs_tree();
        let config = config(dir.path(), "docs", "up");
        assert_eq!(keys(&config), vec!["up/a/x.md", "up/b/y.md"]);
    }

    #[test]
    fn test_directory_flat() {
        let dir = docs_tree();
        let mut config = config(dir.path(), "docs", "up");
        config.flat = true;
        assert_eq!(keys(&config), vec!["up/x.md", "up/y.md"]);
    }

    #[test]
    fn test_directory_includes_dotfiles() {
        let dir = docs_tree();
        touch(dir.path(), "docs/.env");
        touch(dir.path(), "docs/.hidden/z.md");
        let config = config(dir.path(), "docs", "");
        assert_eq!(
            keys(&config),
            vec![".env", ".hidden/z.md", "a/x.md", "b/y.md"]
        );
    }

    #[test]
    fn test_directory_rename_keeps_nesting_and_extension() {
        let dir = docs_tree();
        let mut config = config(dir.path(), "docs", "up");
        config.rename = Rename::Length(8);
        let keys = keys(&config);
        assert_eq!(keys.len(), 2);
        for (key, subdir) in keys.iter().zip(["up/a/", "up/b/"]) {
            let name = key.strip_prefix(subdir).unwrap();
            let stem = name.strip_suffix(".md").unwrap();
            assert_eq!(stem.len(), 8);
            assert!(stem.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_glob_relative_to_common_base() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dist/js/app.js");
        touch(dir.path(), "dist/js/vendor/lib.js");
        touch(dir.path(), "dist/index.html");
        let config = config(dir.path(), "dist/**/*.js", "static");
        assert_eq!(keys(&config), vec!["static/app.js", "static/vendor/lib.js"]);
    }

    #[test]
    fn test_glob_partial_name_prefix_uses_parent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "assets/bc/x.png");
        touch(dir.path(), "assets/bd/y.png");
        let config = config(dir.path(), "assets/b*/*.png", "");
        assert_eq!(keys(&config), vec!["bc/x.png", "bd/y.png"]);
    }

    #[test]
    fn test_glob_single_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dist/js/app.js");
        let config = config(dir.path(), "dist/**/*.js", "static");
        assert_eq!(keys(&config), vec!["static/app.js"]);
    }

    #[test]
    fn test_glob_flat() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dist/js/app.js");
        touch(dir.path(), "dist/css/app.css");
        let mut config = config(dir.path(), "dist/**/app.*", "x");
        config.flat = true;
        assert_eq!(keys(&config), vec!["x/app.css", "x/app.js"]);
    }

    #[test]
    fn test_glob_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "*.nothing", "x");
        assert!(keys(&config).is_empty());
    }

    #[test]
    fn test_ignore_patterns() {
        let dir = docs_tree();
        touch(dir.path(), "docs/a/skip.log");
        let mut config = config(dir.path(), "docs", "");
        config.ignore = vec!["**/*.log".to_string()];
        assert_eq!(keys(&config), vec!["a/x.md", "b/y.md"]);
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let dir = docs_tree();
        let mut config = config(dir.path(), "docs", "");
        config.ignore = vec!["[".to_string()];
        assert!(matches!(
            KeyMapper::new(&config),
            Err(CliError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_rename_collisions_are_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..40 {
            touch(dir.path(), &format!("many/{i}.txt"));
        }
        let mut config = config(dir.path(), "many", "");
        config.rename = Rename::Length(1);
        config.flat = true;
        // 40 files into 36 possible names must collide, yet all are kept
        let keys = keys(&config);
        assert_eq!(keys.len(), 40);
        assert!(keys.iter().collect::<HashSet<_>>().len() < 40);
    }

    #[test]
    fn test_random_stem() {
        let stem = random_stem(16);
        assert_eq!(stem.len(), 16);
        assert!(stem.chars().all(|c| RENAME_ALPHABET.contains(&(c as u8))));
        assert!(random_stem(0).is_empty());
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "a.txt"), "a.txt");
        assert_eq!(join_key("up/", "a/x.md"), "up/a/x.md");
        assert_eq!(join_key("up/./v1/..", "x.md"), "up/x.md");
    }

    #[test]
    fn test_relative_path_climbs() {
        let rel = relative_path(Path::new("/srv/app"), Path::new("/srv/shared/x.txt"));
        assert_eq!(rel, Path::new("../shared/x.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_source_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(dir.path().join("app.sock")).unwrap();
        let config = config(dir.path(), "app.sock", "up");
        let err = KeyMapper::new(&config).unwrap().resolve("app.sock").unwrap_err();
        assert!(matches!(&err, CliError::UnsupportedSource { path } if path.ends_with("app.sock")));
        assert_eq!(err.exit_code(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_fails_the_walk() {
        use std::os::unix::fs::PermissionsExt;

        let dir = docs_tree();
        touch(dir.path(), "docs/locked/z.md");
        let locked = dir.path().join("docs/locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // root reads through any mode bits
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let config = config(dir.path(), "docs", "up");
        let result = KeyMapper::new(&config).unwrap().resolve("docs");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(&err, CliError::Walk { path, .. } if path.ends_with("locked")));
        assert!(err.is_directive_local());
    }

    #[tokio::test]
    async fn test_async_resolve() {
        let dir = docs_tree();
        let config = config(dir.path(), "docs", "up");
        let files = resolve(&config).await.unwrap();
        assert_eq!(files.len(), 2);
    }
}
