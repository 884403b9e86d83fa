//! Upload orchestration
//!
//! A [`Client`] is built once per storage-client configuration and runs
//! upload directives against it one at a time. Each [`Client::upload`]
//! resolves the directive's source, hands the whole file list to the
//! storage provider in one batch (or simulates it in dry-run), collects
//! exactly one [`FileOutcome`] per file as completions arrive in any order,
//! and finally runs CDN cache sync when the client has a CDN bound and at
//! least one file made it.

use crate::cdn::{CacheSync, CacheSyncReport, CdnApi, TencentCdn};
use crate::config::{ClientConfig, UploadConfig, SLICE_SIZE};
use crate::error::{CliError, Result, TransferError};
use crate::mapper::{self, ResolvedFile};
use crate::storage::{CosStorage, FileUpload, ObjectStorage, TransferEvent, TransferReceipt, UploadBatch};
use crate::upload_progress::ProgressAggregator;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Final state of one resolved file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// The file as resolved by the key mapper
    pub file: ResolvedFile,
    /// Service receipt, `None` on failure and in dry-run
    pub provider_result: Option<TransferReceipt>,
    /// Transfer failure, `None` on success and in dry-run
    pub provider_error: Option<TransferError>,
    /// Public URL, empty when the transfer failed
    pub url: String,
}

impl FileOutcome {
    /// Whether the file made it (always true in dry-run)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.provider_error.is_none()
    }
}

/// Everything one `upload` call produced
#[derive(Debug)]
pub struct UploadResult {
    /// One outcome per resolved file, in completion order
    pub files: Vec<FileOutcome>,
    /// Epoch milliseconds when the call started
    pub start_time: i64,
    /// Epoch milliseconds when the batch finished
    pub end_time: i64,
    /// Whether nothing was transferred
    pub dry_run: bool,
    /// Provider failure for the batch as a whole; the client is unusable
    pub batch_error: Option<CliError>,
    /// Cache sync outcome, `None` when no sync ran
    pub cache_sync: Option<Result<CacheSyncReport>>,
}

impl UploadResult {
    /// Files stored successfully
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    /// Files that failed
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.files.len() - self.success_count()
    }

    /// Batch duration in milliseconds
    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        self.end_time - self.start_time
    }

    /// Public URLs of every successful file
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.url.is_empty())
            .map(|f| f.url.clone())
            .collect()
    }
}

/// Receives upload events for live display
///
/// Every method defaults to doing nothing.
pub trait UploadListener: Send {
    /// The file list is known; called once before any transfer
    fn batch_started(&mut self, _files: &[ResolvedFile], _config: &UploadConfig) {}

    /// A file finished
    fn file_finished(&mut self, _outcome: &FileOutcome) {}

    /// Aggregated progress changed (only with `show_progress`)
    fn progress(&mut self, _progress: &ProgressAggregator) {}

    /// The batch is sealed; cache sync may still follow
    fn batch_finished(&mut self) {}
}

/// Listener that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl UploadListener for NoopListener {}

/// A storage client with its public domain and optional CDN
#[derive(Clone)]
pub struct Client {
    name: String,
    domain: String,
    storage: Arc<dyn ObjectStorage>,
    cdn: Option<Arc<dyn CdnApi>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("cdn", &self.cdn.is_some())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build the providers for a client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let storage: Arc<dyn ObjectStorage> = Arc::new(CosStorage::new(config)?);
        let (domain, cdn) = match config.cdn_credentials() {
            Some((domain, credentials)) => {
                let cdn: Arc<dyn CdnApi> = Arc::new(TencentCdn::new(&credentials, config.timeout_secs)?);
                (domain.to_string(), Some(cdn))
            }
            None => (config.default_domain(), None),
        };
        let name = if config.name.is_empty() {
            config.bucket.clone()
        } else {
            config.name.clone()
        };
        tracing::debug!(client = %name, %domain, cdn = cdn.is_some(), "client ready");
        Ok(Self::with_parts(name, domain, storage, cdn))
    }

    /// Assemble a client from ready-made providers
    #[must_use]
    pub fn with_parts(
        name: impl Into<String>,
        domain: impl Into<String>,
        storage: Arc<dyn ObjectStorage>,
        cdn: Option<Arc<dyn CdnApi>>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            storage,
            cdn,
        }
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public domain objects are served from
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `https://{domain}/{key}`
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        format!("https://{}/{key}", self.domain)
    }

    /// Run one upload directive
    ///
    /// Resolution errors are returned before anything is transferred.
    /// Per-file failures end up in the outcomes, a provider giving up on the
    /// batch in [`UploadResult::batch_error`] and a cache-sync failure in
    /// [`UploadResult::cache_sync`].
    pub async fn upload(&self, config: &UploadConfig, listener: &mut dyn UploadListener) -> Result<UploadResult> {
        let start_time = Utc::now().timestamp_millis();
        let files = mapper::resolve(config).await?;
        Ok(self.upload_resolved(files, config, listener, start_time).await)
    }

    /// Run a directive whose files are already resolved
    pub async fn upload_resolved(
        &self,
        files: Vec<ResolvedFile>,
        config: &UploadConfig,
        listener: &mut dyn UploadListener,
        start_time: i64,
    ) -> UploadResult {
        listener.batch_started(&files, config);

        if config.dry_run {
            let files = files
                .into_iter()
                .map(|file| FileOutcome {
                    url: self.public_url(&file.remote_key),
                    file,
                    provider_result: None,
                    provider_error: None,
                })
                .collect();
            listener.batch_finished();
            return UploadResult {
                files,
                start_time,
                end_time: Utc::now().timestamp_millis(),
                dry_run: true,
                batch_error: None,
                cache_sync: None,
            };
        }

        let (outcomes, batch_error) = if files.is_empty() {
            (Vec::new(), None)
        } else {
            self.transfer(files, config.show_progress, listener).await
        };
        listener.batch_finished();

        let mut result = UploadResult {
            files: outcomes,
            start_time,
            end_time: Utc::now().timestamp_millis(),
            dry_run: false,
            batch_error,
            cache_sync: None,
        };
        tracing::info!(
            client = %self.name,
            total = result.files.len(),
            failed = result.failure_count(),
            batch_failed = result.batch_error.is_some(),
            "batch finished"
        );

        if let (Some(cdn), None) = (&self.cdn, &result.batch_error) {
            let wanted = config.cdn_purge_cache.is_enabled() || config.cdn_push_cache.is_enabled();
            let urls = result.urls();
            if wanted && !urls.is_empty() {
                result.cache_sync = Some(
                    CacheSync::new(cdn.as_ref())
                        .run(&urls, &config.cdn_purge_cache, &config.cdn_push_cache)
                        .await,
                );
            }
        }
        result
    }

    /// Submit the batch and collect one outcome per file, plus the provider's
    /// batch error if it gave up
    async fn transfer(
        &self,
        files: Vec<ResolvedFile>,
        show_progress: bool,
        listener: &mut dyn UploadListener,
    ) -> (Vec<FileOutcome>, Option<CliError>) {
        let total = files.len();
        let batch = UploadBatch {
            files: files
                .iter()
                .enumerate()
                .map(|(index, file)| FileUpload {
                    index,
                    path: file.full_path.clone(),
                    key: file.remote_key.clone(),
                })
                .collect(),
            slice_size: SLICE_SIZE,
        };

        let (events, mut rx) = mpsc::unbounded_channel();
        let mut slots: Vec<Option<ResolvedFile>> = files.into_iter().map(Some).collect();
        let mut outcomes = Vec::with_capacity(total);
        let mut progress = show_progress.then(|| ProgressAggregator::new(total));

        let provider = self.storage.upload_files(batch, events);
        let collect = async {
            while outcomes.len() < total {
                let Some(event) = rx.recv().await else {
                    break;
                };
                match event {
                    TransferEvent::Progress(sample) => {
                        if let Some(progress) = progress.as_mut() {
                            progress.update(sample);
                            listener.progress(progress);
                        }
                    }
                    TransferEvent::FileFinished { index, result } => {
                        let Some(file) = slots.get_mut(index).and_then(Option::take) else {
                            tracing::warn!(index, "ignoring duplicate or unknown completion");
                            continue;
                        };
                        let outcome = self.outcome(file, result);
                        if let Some(progress) = progress.as_mut() {
                            progress.file_finished(outcome.is_success());
                            listener.progress(progress);
                        }
                        listener.file_finished(&outcome);
                        outcomes.push(outcome);
                    }
                }
            }
        };
        let (provider_result, ()) = tokio::join!(provider, collect);

        let missing: Vec<ResolvedFile> = slots.into_iter().flatten().collect();
        if !missing.is_empty() {
            let reason = match &provider_result {
                Err(e) => e.to_string(),
                Ok(()) => "provider finished without reporting the file".to_string(),
            };
            tracing::warn!(missing = missing.len(), %reason, "files without a completion");
            for file in missing {
                let outcome = self.outcome(file, Err(TransferError::Batch(reason.clone())));
                if let Some(progress) = progress.as_mut() {
                    progress.file_finished(false);
                    listener.progress(progress);
                }
                listener.file_finished(&outcome);
                outcomes.push(outcome);
            }
        }
        let batch_error = provider_result.err().map(|e| CliError::Storage(e.to_string()));
        (outcomes, batch_error)
    }

    fn outcome(&self, file: ResolvedFile, result: std::result::Result<TransferReceipt, TransferError>) -> FileOutcome {
        match result {
            Ok(receipt) => {
                tracing::debug!(key = %file.remote_key, "uploaded");
                FileOutcome {
                    url: self.public_url(&file.remote_key),
                    file,
                    provider_result: Some(receipt),
                    provider_error: None,
                }
            }
            Err(e) => {
                tracing::debug!(key = %file.remote_key, error = %e, "upload failed");
                FileOutcome {
                    file,
                    provider_result: None,
                    provider_error: Some(e),
                    url: String::new(),
                }
            }
        }
    }
}
