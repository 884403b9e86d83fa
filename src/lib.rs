#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

//! # coscmd
//!
//! Upload planning and execution for Tencent Cloud COS.
//!
//! ## Architecture
//!
//! - **[`mapper`]** - resolves a source (file, directory or glob) into local files and remote keys
//! - **[`prefix`]** - longest common prefix used to find the base of glob matches
//! - **[`upload`]** - the orchestrator: one batch per directive, one outcome per file
//! - **[`upload_progress`]** - aggregated batch progress and its terminal bar
//! - **[`cdn`]** - chunked CDN cache purge and push after an upload
//! - **[`storage`]** - the storage provider seam and the COS adapter
//! - **[`config`]** - `cos.config.toml` discovery, merging and validation
//! - **[`commands`]**, **[`cli`]**, **[`report`]** - the `cos` binary

pub mod cdn;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mapper;
pub mod prefix;
pub mod report;
pub mod sign;
pub mod storage;
pub mod upload;
pub mod upload_progress;

/// Error type alias for convenience
pub use error::{CliError, Result};

/// Configuration type alias for convenience
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = "coscmd";
