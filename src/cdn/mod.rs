//! CDN cache synchronisation after an upload
//!
//! [`CacheSync`] splits the uploaded URLs into provider-sized chunks and runs
//! one purge or push request per chunk, strictly one after another. The first
//! failing chunk stops the step and is reported as a cache-sync error, which
//! never touches the file outcomes of the batch.

use crate::config::{CdnCacheOption, PurgeOverrides, PushOverrides, PURGE_BATCH_SIZE, PUSH_BATCH_SIZE};
use crate::error::{CacheOperation, CliError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod tencent;

pub use tencent::TencentCdn;

/// `PurgeUrlsCache` request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PurgeUrlsCacheRequest {
    /// URLs to purge, at most [`PURGE_BATCH_SIZE`]
    pub urls: Vec<String>,
    /// Purge region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Encode Chinese characters before purging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_encode: Option<bool>,
}

impl PurgeUrlsCacheRequest {
    /// Request for a chunk, with caller overrides merged in
    #[must_use]
    pub fn new(urls: Vec<String>, overrides: Option<&PurgeOverrides>) -> Self {
        let overrides = overrides.cloned().unwrap_or_default();
        Self {
            urls,
            area: overrides.area,
            url_encode: overrides.url_encode,
        }
    }
}

/// `PushUrlsCache` request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushUrlsCacheRequest {
    /// URLs to warm, at most [`PUSH_BATCH_SIZE`]
    pub urls: Vec<String>,
    /// User-Agent of warm-up requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Warm-up region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Layer to warm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Follow m3u8 playlists
    #[serde(rename = "ParseM3U8", skip_serializing_if = "Option::is_none")]
    pub parse_m3u8: Option<bool>,
    /// Disable range requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_range: Option<bool>,
    /// Encode Chinese characters before pushing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_encode: Option<bool>,
}

impl PushUrlsCacheRequest {
    /// Request for a chunk, with caller overrides merged in
    #[must_use]
    pub fn new(urls: Vec<String>, overrides: Option<&PushOverrides>) -> Self {
        let overrides = overrides.cloned().unwrap_or_default();
        Self {
            urls,
            user_agent: overrides.user_agent,
            area: overrides.area,
            layer: overrides.layer,
            parse_m3u8: overrides.parse_m3u8,
            disable_range: overrides.disable_range,
            url_encode: overrides.url_encode,
        }
    }
}

/// Task created by a purge or push request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CdnTask {
    /// Task id for later status queries
    #[serde(default)]
    pub task_id: String,
    /// Request id for support tickets
    #[serde(default)]
    pub request_id: String,
}

/// Failure of a single CDN request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CdnError {
    /// Error object returned by the API
    #[error("{code}: {message} (request {request_id})")]
    Api {
        /// API error code
        code: String,
        /// API error message
        message: String,
        /// Request id
        request_id: String,
    },

    /// Request never got a response
    #[error("Request failed: {0}")]
    Network(String),

    /// Response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be signed
    #[error("Request signing failed: {0}")]
    Signing(String),
}

/// A CDN service able to purge and pre-warm URL caches
#[async_trait]
pub trait CdnApi: Send + Sync {
    /// Invalidate cached copies of the URLs
    async fn purge_urls_cache(&self, request: PurgeUrlsCacheRequest) -> std::result::Result<CdnTask, CdnError>;

    /// Fetch the URLs into edge caches ahead of demand
    async fn push_urls_cache(&self, request: PushUrlsCacheRequest) -> std::result::Result<CdnTask, CdnError>;
}

/// Number of requests each operation issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSyncReport {
    /// Purge requests sent, `None` when purge was off
    pub purge_calls: Option<usize>,
    /// Push requests sent, `None` when push was off
    pub push_calls: Option<usize>,
}

/// Runs chunked cache operations against one CDN
#[derive(Clone, Copy)]
pub struct CacheSync<'a> {
    cdn: &'a dyn CdnApi,
}

impl std::fmt::Debug for CacheSync<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSync").finish_non_exhaustive()
    }
}

impl<'a> CacheSync<'a> {
    /// Coordinator over a CDN client
    #[must_use]
    pub fn new(cdn: &'a dyn CdnApi) -> Self {
        Self { cdn }
    }

    /// Purge first, then push, as requested
    pub async fn run(
        &self,
        urls: &[String],
        purge: &CdnCacheOption<PurgeOverrides>,
        push: &CdnCacheOption<PushOverrides>,
    ) -> Result<CacheSyncReport> {
        let mut report = CacheSyncReport::default();
        if purge.is_enabled() {
            report.purge_calls = Some(self.purge(urls, purge.overrides()).await?);
        }
        if push.is_enabled() {
            report.push_calls = Some(self.push(urls, push.overrides()).await?);
        }
        Ok(report)
    }

    /// Purge in chunks of at most [`PURGE_BATCH_SIZE`]; returns the request count
    pub async fn purge(&self, urls: &[String], overrides: Option<&PurgeOverrides>) -> Result<usize> {
        let mut calls = 0;
        for (chunk, batch) in urls.chunks(PURGE_BATCH_SIZE).enumerate() {
            let request = PurgeUrlsCacheRequest::new(batch.to_vec(), overrides);
            let task = self
                .cdn
                .purge_urls_cache(request)
                .await
                .map_err(|e| sync_error(CacheOperation::Purge, chunk, batch.len(), &e))?;
            tracing::debug!(chunk, urls = batch.len(), task_id = %task.task_id, "cdn purge submitted");
            calls += 1;
        }
        Ok(calls)
    }

    /// Push in chunks of at most [`PUSH_BATCH_SIZE`]; returns the request count
    pub async fn push(&self, urls: &[String], overrides: Option<&PushOverrides>) -> Result<usize> {
        let mut calls = 0;
        for (chunk, batch) in urls.chunks(PUSH_BATCH_SIZE).enumerate() {
            let request = PushUrlsCacheRequest::new(batch.to_vec(), overrides);
            let task = self
                .cdn
                .push_urls_cache(request)
                .await
                .map_err(|e| sync_error(CacheOperation::Push, chunk, batch.len(), &e))?;
            tracing::debug!(chunk, urls = batch.len(), task_id = %task.task_id, "cdn push submitted");
            calls += 1;
        }
        Ok(calls)
    }
}

fn sync_error(operation: CacheOperation, chunk: usize, urls: usize, err: &CdnError) -> CliError {
    CliError::CacheSync {
        operation,
        chunk,
        urls,
        reason: err.to_string(),
    }
}
