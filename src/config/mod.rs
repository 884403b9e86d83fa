//! Configuration management for coscmd
//!
//! Handles discovering, loading, merging and validating `cos.config.toml`
//! files. The result is the resolved configuration object the upload engine
//! consumes: a list of storage clients and a list of upload directives.

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod client;
pub mod defaults;
pub mod upload;

pub use client::{CdnBinding, CdnCredentials, ClientConfig};
pub use defaults::*;
pub use upload::{CdnCacheOption, PurgeOverrides, PushOverrides, Rename, UploadConfig};

/// A single table or an array of tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// `[[client]]`
    Many(Vec<T>),
    /// `[client]`
    One(T),
}

impl<T> OneOrMany<T> {
    /// Flatten into a list
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Main configuration file content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage clients
    #[serde(default)]
    pub client: Option<OneOrMany<ClientConfig>>,

    /// Upload directives used when no source is given on the command line
    #[serde(default)]
    pub upload: Option<OneOrMany<UploadConfig>>,
}

impl Config {
    /// Load and merge configuration
    ///
    /// With an explicit file only that file is read and it must exist.
    /// Otherwise tries in order, later files overriding earlier ones:
    /// 1. ~/cos.config.toml
    /// 2. ./cos.config.toml
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let files = match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::ConfigRead {
                        path: path.to_path_buf(),
                        reason: "file does not exist".to_string(),
                    });
                }
                vec![path.to_path_buf()]
            }
            None => Self::config_paths()?,
        };

        let mut config = Self::default();
        for file in files {
            if !file.exists() {
                tracing::debug!(path = %file.display(), "config file not found, skipping");
                continue;
            }
            let loaded = Self::load_from(&file)?;
            tracing::debug!(path = %file.display(), "config file loaded");
            config.merge(loaded);
        }
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| CliError::ConfigRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&contents)
            .map_err(|e| CliError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Default discovery locations, lowest precedence first
    pub fn config_paths() -> Result<Vec<PathBuf>> {
        let cwd = std::env::current_dir().map_err(|e| CliError::io(".", &e))?;
        let mut paths = Vec::with_capacity(2);
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_FILE_NAME));
        }
        let local = cwd.join(CONFIG_FILE_NAME);
        if !paths.contains(&local) {
            paths.push(local);
        }
        Ok(paths)
    }

    /// Merge another config into this one, with other taking precedence
    ///
    /// Top-level keys are replaced wholesale, never merged item by item.
    pub fn merge(&mut self, other: Self) {
        if other.client.is_some() {
            self.client = other.client;
        }
        if other.upload.is_some() {
            self.upload = other.upload;
        }
    }

    /// Every configured client, enabled or not
    #[must_use]
    pub fn clients(&self) -> Vec<ClientConfig> {
        self.client.clone().map(OneOrMany::into_vec).unwrap_or_default()
    }

    /// Enabled clients, validated; at least one is required
    pub fn enabled_clients(&self) -> Result<Vec<ClientConfig>> {
        let clients: Vec<ClientConfig> = self.clients().into_iter().filter(|c| c.enable).collect();
        if clients.is_empty() {
            return Err(CliError::NoClients);
        }
        for client in &clients {
            client.validate()?;
        }
        Ok(clients)
    }

    /// Configured upload directives
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadConfig> {
        self.upload.clone().map(OneOrMany::into_vec).unwrap_or_default()
    }
}
