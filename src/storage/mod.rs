//! Object storage provider seam
//!
//! The orchestrator hands a whole batch to an [`ObjectStorage`] in one call.
//! The provider owns parallelism, ordering and retries; it reports back
//! through a channel of [`TransferEvent`]s, with exactly one
//! [`TransferEvent::FileFinished`] per submitted file in completion order.

#![allow(clippy::cast_precision_loss)] // Progress display - precision loss acceptable

use crate::error::TransferError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;

pub mod cos;

pub use cos::{BucketParams, CosStorage};

/// One file of a batch
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Position in the submitted batch, echoed back on completion
    pub index: usize,
    /// Absolute local path
    pub path: PathBuf,
    /// Object key
    pub key: String,
}

/// A batch of files submitted in one call
#[derive(Debug, Clone)]
pub struct UploadBatch {
    /// Files to transfer
    pub files: Vec<FileUpload>,
    /// Files larger than this are uploaded in parts
    pub slice_size: u64,
}

/// Byte-level progress across the whole batch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressSample {
    /// Bytes sent so far
    pub loaded_bytes: u64,
    /// Bytes known so far; grows while file sizes are discovered
    pub total_bytes: u64,
    /// Average throughput since the batch started
    pub bytes_per_second: f64,
    /// `loaded_bytes / total_bytes`, 0..=1
    pub fraction_complete: f64,
}

/// What the service returned for a stored object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    /// Object ETag
    pub etag: Option<String>,
    /// Request URL of the object
    pub location: String,
    /// Whether the multipart protocol was used
    pub multipart: bool,
}

/// Events a provider emits while a batch runs
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Byte progress changed
    Progress(ProgressSample),
    /// One file finished, successfully or not
    FileFinished {
        /// [`FileUpload::index`] of the finished file
        index: usize,
        /// Service receipt or failure
        result: std::result::Result<TransferReceipt, TransferError>,
    },
}

/// Sending half handed to providers
pub type EventSender = mpsc::UnboundedSender<TransferEvent>;

/// A storage service able to upload a batch of files
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload every file of the batch, reporting through `events`
    ///
    /// Per-file failures are reported as events, not returned. An `Err`
    /// means the provider gave up on the batch as a whole.
    async fn upload_files(
        &self,
        batch: UploadBatch,
        events: EventSender,
    ) -> std::result::Result<(), TransferError>;
}

/// Shared byte counters for a running batch
#[derive(Debug)]
pub struct TransferMeter {
    loaded: AtomicU64,
    total: AtomicU64,
    started: Instant,
}

impl Default for TransferMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMeter {
    /// Start measuring now
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaded: AtomicU64::new(0),
            total: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// A file's size became known
    pub fn add_total(&self, bytes: u64) -> ProgressSample {
        let _ = self.total.fetch_add(bytes, Ordering::Relaxed);
        self.sample()
    }

    /// Bytes were sent
    pub fn add_loaded(&self, bytes: u64) -> ProgressSample {
        let _ = self.loaded.fetch_add(bytes, Ordering::Relaxed);
        self.sample()
    }

    /// Current progress
    pub fn sample(&self) -> ProgressSample {
        let loaded_bytes = self.loaded.load(Ordering::Relaxed);
        let total_bytes = self.total.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        ProgressSample {
            loaded_bytes,
            total_bytes,
            bytes_per_second: if elapsed > 0.0 {
                loaded_bytes as f64 / elapsed
            } else {
                0.0
            },
            fraction_complete: if total_bytes > 0 {
                (loaded_bytes as f64 / total_bytes as f64).min(1.0)
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_fraction() {
        let meter = TransferMeter::new();
        assert_eq!(meter.sample().fraction_complete, 0.0);
        let _ = meter.add_total(200);
        let sample = meter.add_loaded(50);
        assert_eq!(sample.loaded_bytes, 50);
        assert_eq!(sample.total_bytes, 200);
        assert!((sample.fraction_complete - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_meter_total_grows() {
        let meter = TransferMeter::new();
        let _ = meter.add_total(100);
        let _ = meter.add_loaded(100);
        let sample = meter.add_total(100);
        assert_eq!(sample.total_bytes, 200);
        assert!((sample.fraction_complete - 0.5).abs() < f64::EPSILON);
    }
}
