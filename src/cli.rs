//! Command-line interface argument parsing
//!
//! Defines all CLI commands and their arguments using Clap.

use crate::config::{CdnCacheOption, Rename, UploadConfig, DEFAULT_RENAME_LENGTH};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// coscmd - upload local files to Tencent Cloud COS and refresh the CDN
#[derive(Parser, Debug)]
#[command(name = "cos")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload local files to Tencent Cloud COS and refresh the bound CDN")]
#[command(long_about = concat!(
    "coscmd (v", env!("CARGO_PKG_VERSION"), ")\n",
    "Upload files, directories or glob matches to one or more COS buckets.\n\n",
    "Clients and default upload directives are read from cos.config.toml in\n",
    "your home directory and the current directory."
))]
pub struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file only
    #[arg(long, global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload local files to COS
    ///
    /// Without a source, the [[upload]] directives of the configuration are
    /// run with the flags given here applied on top.
    ///
    /// Examples:
    ///   cos upload ./dist static
    ///   cos up "dist/**/*.js" static/js --rename --cdn-purge-cache
    ///   cos up                             # run configured directives
    #[command(visible_alias = "up")]
    #[command(display_order = 1)]
    Upload(UploadArgs),

    /// Inspect configured clients
    ///
    /// Examples:
    ///   cos client
    ///   cos client list --detail
    #[command(display_order = 2)]
    Client {
        #[command(subcommand)]
        command: Option<ClientCommand>,
    },
}

/// `client` sub-commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// List configured clients
    List {
        /// Print every field, with secrets masked
        #[arg(long)]
        detail: bool,
    },
}

impl Default for ClientCommand {
    fn default() -> Self {
        Self::List { detail: false }
    }
}

/// Arguments of `upload`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadArgs {
    /// File, directory or glob pattern to upload
    pub source: Option<String>,

    /// Remote path; defaults to the bucket root
    pub target: Option<String>,

    /// Glob patterns of files to skip, relative to the working directory
    #[arg(long, num_args = 1.., value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Replace file names with random lowercase letters and digits
    #[arg(
        long,
        num_args = 0..=1,
        value_name = "LENGTH",
        default_missing_value = "16",
        value_parser = parse_rename
    )]
    pub rename: Option<usize>,

    /// Upload every file directly under the target
    #[arg(long)]
    pub flat: bool,

    /// Show a progress bar instead of one line per file
    #[arg(long)]
    pub show_progress: bool,

    /// Purge the CDN cache of uploaded files
    #[arg(long)]
    pub cdn_purge_cache: bool,

    /// Pre-warm the CDN cache of uploaded files
    #[arg(long)]
    pub cdn_push_cache: bool,

    /// Resolve and print without uploading
    #[arg(long)]
    pub dry_run: bool,
}

/// Non-numeric or zero lengths fall back to the default
#[allow(clippy::unnecessary_wraps)]
fn parse_rename(value: &str) -> Result<usize, String> {
    Ok(value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|length| *length > 0)
        .unwrap_or(DEFAULT_RENAME_LENGTH))
}

impl UploadArgs {
    /// Directive built from the arguments alone
    #[must_use]
    pub fn to_directive(&self) -> Option<UploadConfig> {
        let source = self.source.as_ref()?;
        let mut directive = UploadConfig::new(source.clone());
        directive.target = self.target.clone().unwrap_or_default();
        self.overlay(&mut directive);
        Some(directive)
    }

    /// Apply the flags that were given onto a configured directive
    pub fn overlay(&self, directive: &mut UploadConfig) {
        if !self.ignore.is_empty() {
            directive.ignore.clone_from(&self.ignore);
        }
        if let Some(length) = self.rename {
            directive.rename = Rename::Length(length);
        }
        directive.flat |= self.flat;
        directive.show_progress |= self.show_progress;
        directive.dry_run |= self.dry_run;
        if self.cdn_purge_cache && !directive.cdn_purge_cache.is_enabled() {
            directive.cdn_purge_cache = CdnCacheOption::Enabled(true);
        }
        if self.cdn_push_cache && !directive.cdn_push_cache.is_enabled() {
            directive.cdn_push_cache = CdnCacheOption::Enabled(true);
        }
    }
}

impl Cli {
    /// Parse command-line arguments
    ///
    /// # Returns
    ///
    /// Parsed CLI arguments
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PurgeOverrides;

    fn upload_args(args: &[&str]) -> UploadArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Upload(args) => args,
            Commands::Client { .. } => panic!("expected upload"),
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_up_alias_and_positionals() {
        let args = upload_args(&["cos", "up", "dist", "static", "--flat", "--dry-run"]);
        assert_eq!(args.source.as_deref(), Some("dist"));
        assert_eq!(args.target.as_deref(), Some("static"));
        assert!(args.flat);
        assert!(args.dry_run);
        assert_eq!(args.rename, None);
    }

    #[test]
    fn test_rename_flag_forms() {
        assert_eq!(upload_args(&["cos", "upload", "a", "--rename"]).rename, Some(16));
        assert_eq!(upload_args(&["cos", "upload", "a", "--rename", "8"]).rename, Some(8));
        assert_eq!(upload_args(&["cos", "upload", "a", "--rename=0"]).rename, Some(16));
    }

    #[test]
    fn test_ignore_takes_many() {
        let args = upload_args(&["cos", "upload", "dist", "--ignore", "*.map", "**/*.txt"]);
        assert_eq!(args.ignore, vec!["*.map", "**/*.txt"]);
    }

    #[test]
    fn test_client_defaults_to_list() {
        let cli = Cli::try_parse_from(["cos", "client"]).unwrap();
        assert!(matches!(cli.command, Commands::Client { command: None }));
        let cli = Cli::try_parse_from(["cos", "--config-file", "x.toml", "client", "list", "--detail"]).unwrap();
        assert_eq!(cli.config_file, Some(PathBuf::from("x.toml")));
        assert!(matches!(
            cli.command,
            Commands::Client {
                command: Some(ClientCommand::List { detail: true })
            }
        ));
    }

    #[test]
    fn test_directive_from_arguments() {
        let args = upload_args(&["cos", "up", "dist", "/static", "--cdn-push-cache"]);
        let directive = args.to_directive().unwrap();
        assert_eq!(directive.source, "dist");
        assert_eq!(directive.normalized_target(), "static");
        assert!(directive.cdn_push_cache.is_enabled());
        assert!(!directive.cdn_purge_cache.is_enabled());
        assert!(upload_args(&["cos", "up"]).to_directive().is_none());
    }

    #[test]
    fn test_overlay_keeps_configured_overrides() {
        let mut directive = UploadConfig::new("dist");
        directive.cdn_purge_cache = CdnCacheOption::Custom(PurgeOverrides {
            area: Some("mainland".to_string()),
            url_encode: None,
        });
        directive.ignore = vec!["*.map".to_string()];
        let args = upload_args(&["cos", "up", "--cdn-purge-cache", "--rename", "6"]);
        args.overlay(&mut directive);
        assert!(matches!(directive.cdn_purge_cache, CdnCacheOption::Custom(_)));
        assert_eq!(directive.rename, Rename::Length(6));
        assert_eq!(directive.ignore, vec!["*.map"]);
    }
}
