//! Tencent Cloud COS storage over its S3-compatible API
//!
//! [`CosStorage`] is a bucket-scoped adapter: bucket and region are captured
//! once from the client configuration and filled into every request, so
//! callers only ever deal in object keys.

use super::{EventSender, FileUpload, ObjectStorage, TransferEvent, TransferMeter, TransferReceipt, UploadBatch};
use crate::config::{ClientConfig, COS_HOST_SUFFIX, PART_SIZE};
use crate::error::{CliError, TransferError};
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::time::Duration;

/// Most parts a multipart upload may have
pub const MAX_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// Bucket and region every request is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketParams {
    /// Bucket name including the APPID suffix
    pub bucket: String,
    /// Bucket region
    pub region: String,
}

/// COS client bound to one bucket
#[derive(Debug, Clone)]
pub struct CosStorage {
    client: aws_sdk_s3::Client,
    bucket: BucketParams,
    scheme: &'static str,
    host: String,
    parallelism: usize,
}

impl CosStorage {
    /// Build a client for the configured bucket
    pub fn new(config: &ClientConfig) -> crate::Result<Self> {
        if config.bucket.is_empty() || config.region.is_empty() {
            return Err(CliError::Storage("bucket and region are required".to_string()));
        }

        let credentials = Credentials::new(&config.secret_id, &config.secret_key, None, None, "coscmd-config");
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let sdk_config = aws_sdk_s3::Config::builder()
            .endpoint_url(service_endpoint(config))
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(false)
            .timeout_config(timeouts)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();
        let (scheme, host) = bucket_host(config);

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            bucket: BucketParams {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
            },
            scheme,
            host,
            parallelism: config.parallelism.max(1),
        })
    }

    /// Bucket and region this client writes to
    #[must_use]
    pub const fn bucket(&self) -> &BucketParams {
        &self.bucket
    }

    /// Request URL of an object
    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme, self.host, encode_key_path(key))
    }

    /// Store a local file as one object
    pub async fn put_object(&self, key: &str, path: &Path) -> Result<TransferReceipt, TransferError> {
        let body = ByteStream::from_path(path).await.map_err(|e| read_error(path, &e))?;
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(TransferReceipt {
            etag: output.e_tag().map(str::to_string),
            location: self.object_url(key),
            multipart: false,
        })
    }

    async fn upload_one(
        &self,
        file: &FileUpload,
        slice_size: u64,
        meter: &TransferMeter,
        events: &EventSender,
    ) -> Result<TransferReceipt, TransferError> {
        let size = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| read_error(&file.path, &e))?
            .len();
        let _ = events.send(TransferEvent::Progress(meter.add_total(size)));

        if size > slice_size {
            return self.multipart(file, size, meter, events).await;
        }
        let receipt = self.put_object(&file.key, &file.path).await?;
        let _ = events.send(TransferEvent::Progress(meter.add_loaded(size)));
        Ok(receipt)
    }

    async fn multipart(
        &self,
        file: &FileUpload,
        size: u64,
        meter: &TransferMeter,
        events: &EventSender,
    ) -> Result<TransferReceipt, TransferError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket.bucket)
            .key(&file.key)
            .send()
            .await
            .map_err(sdk_error)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| TransferError::InvalidResponse("missing UploadId".to_string()))?
            .to_string();
        tracing::debug!(key = %file.key, size, %upload_id, "multipart upload started");

        match self.upload_parts(file, size, &upload_id, meter, events).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                let abort = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket.bucket)
                    .key(&file.key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                if let Err(abort) = abort {
                    tracing::warn!(
                        key = %file.key,
                        %upload_id,
                        error = %DisplayErrorContext(&abort),
                        "failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        file: &FileUpload,
        size: u64,
        upload_id: &str,
        meter: &TransferMeter,
        events: &EventSender,
    ) -> Result<TransferReceipt, TransferError> {
        let part_size = part_size_for(size);
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1i32;

        while offset < size {
            let len = part_size.min(size - offset);
            let body = ByteStream::read_from()
                .path(&file.path)
                .offset(offset)
                .length(Length::Exact(len))
                .build()
                .await
                .map_err(|e| read_error(&file.path, &e))?;

            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket.bucket)
                .key(&file.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(sdk_error)?;
            let part_etag = output.e_tag().ok_or_else(|| {
                TransferError::InvalidResponse(format!("part {part_number} has no ETag"))
            })?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(part_etag)
                    .build(),
            );

            let _ = events.send(TransferEvent::Progress(meter.add_loaded(len)));
            offset += len;
            part_number += 1;
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket.bucket)
            .key(&file.key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(TransferReceipt {
            etag: output.e_tag().map(str::to_string),
            location: self.object_url(&file.key),
            multipart: true,
        })
    }
}

#[async_trait]
impl ObjectStorage for CosStorage {
    async fn upload_files(&self, batch: UploadBatch, events: EventSender) -> Result<(), TransferError> {
        let meter = TransferMeter::new();
        let slice_size = batch.slice_size;
        tracing::debug!(
            bucket = %self.bucket.bucket,
            files = batch.files.len(),
            parallelism = self.parallelism,
            "batch upload started"
        );

        let uploads = batch.files.into_iter().map(|file| {
            let meter = &meter;
            let events = &events;
            async move {
                let result = self.upload_one(&file, slice_size, meter, events).await;
                if let Err(e) = &result {
                    tracing::debug!(key = %file.key, error = %e, "file upload failed");
                }
                let _ = events.send(TransferEvent::FileFinished {
                    index: file.index,
                    result,
                });
            }
        });

        let _: Vec<()> = stream::iter(uploads)
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        tracing::debug!(bucket = %self.bucket.bucket, "batch upload finished");
        Ok(())
    }
}

/// Part size for a multipart upload of `size` bytes
///
/// [`PART_SIZE`] unless that would need more than [`MAX_PARTS`] parts, in
/// which case the smallest whole number of MiB that fits.
#[must_use]
pub const fn part_size_for(size: u64) -> u64 {
    let needed = size.div_ceil(MAX_PARTS).div_ceil(MIB) * MIB;
    if needed > PART_SIZE {
        needed
    } else {
        PART_SIZE
    }
}

/// Service endpoint the SDK prefixes with the bucket name
fn service_endpoint(config: &ClientConfig) -> String {
    match config.endpoint.as_deref() {
        Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
            endpoint.trim_end_matches('/').to_string()
        }
        Some(endpoint) => format!("https://{}", endpoint.trim_end_matches('/')),
        None => format!("https://cos.{}.{COS_HOST_SUFFIX}", config.region),
    }
}

/// Scheme and virtual-hosted bucket host
fn bucket_host(config: &ClientConfig) -> (&'static str, String) {
    let endpoint = service_endpoint(config);
    let (scheme, host) = endpoint
        .strip_prefix("http://")
        .map_or_else(|| ("https", endpoint.trim_start_matches("https://")), |host| ("http", host));
    (scheme, format!("{}.{host}", config.bucket))
}

/// RFC 3986 encoding of every key segment, keeping the `/` separators
fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: &Path, err: &impl std::fmt::Display) -> TransferError {
    TransferError::Read {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Status and service error code when COS answered, network error otherwise
fn sdk_error<E>(err: SdkError<E, HttpResponse>) -> TransferError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let Some(status) = err.raw_response().map(|response| response.status().as_u16()) else {
        return TransferError::Network(DisplayErrorContext(&err).to_string());
    };
    let body = match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        _ => DisplayErrorContext(&err).to_string(),
    };
    TransferError::Status { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            enable: true,
            bucket: "assets-1250000000".to_string(),
            region: "ap-guangzhou".to_string(),
            secret_id: "id".to_string(),
            secret_key: "key".to_string(),
            timeout_secs: 30,
            parallelism: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(service_endpoint(&config()), "https://cos.ap-guangzhou.myqcloud.com");
        let (scheme, host) = bucket_host(&config());
        assert_eq!(scheme, "https");
        assert_eq!(host, "assets-1250000000.cos.ap-guangzhou.myqcloud.com");
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = config();
        config.endpoint = Some("https://cos.accelerate.myqcloud.com/".to_string());
        assert_eq!(service_endpoint(&config), "https://cos.accelerate.myqcloud.com");
        assert_eq!(
            bucket_host(&config),
            ("https", "assets-1250000000.cos.accelerate.myqcloud.com".to_string())
        );
        config.endpoint = Some("cos.accelerate.myqcloud.com".to_string());
        assert_eq!(service_endpoint(&config), "https://cos.accelerate.myqcloud.com");
        config.endpoint = Some("http://127.0.0.1:9000".to_string());
        assert_eq!(bucket_host(&config), ("http", "assets-1250000000.127.0.0.1:9000".to_string()));
    }

    #[test]
    fn test_storage_is_bucket_scoped() {
        let storage = CosStorage::new(&config()).unwrap();
        assert_eq!(storage.bucket().bucket, "assets-1250000000");
        assert_eq!(storage.bucket().region, "ap-guangzhou");
        assert_eq!(
            storage.object_url("static/上 传.js"),
            "https://assets-1250000000.cos.ap-guangzhou.myqcloud.com/static/%E4%B8%8A%20%E4%BC%A0.js"
        );
    }

    #[test]
    fn test_missing_bucket_is_a_client_error() {
        let mut config = config();
        config.bucket.clear();
        assert!(matches!(CosStorage::new(&config), Err(CliError::Storage(_))));
    }

    #[test]
    fn test_part_size_stays_default_up_to_part_limit() {
        assert_eq!(part_size_for(0), PART_SIZE);
        assert_eq!(part_size_for(51 * MIB), PART_SIZE);
        assert_eq!(part_size_for(PART_SIZE * MAX_PARTS), PART_SIZE);
    }

    #[test]
    fn test_part_size_grows_past_part_limit() {
        let size = PART_SIZE * MAX_PARTS + 1;
        assert_eq!(part_size_for(size), PART_SIZE + MIB);
        assert!(size.div_ceil(part_size_for(size)) <= MAX_PARTS);

        let five_tib = 5 * 1024 * 1024 * MIB;
        let part = part_size_for(five_tib);
        assert_eq!(part % MIB, 0);
        assert!(five_tib.div_ceil(part) <= MAX_PARTS);
        assert!(five_tib.div_ceil(part - MIB) > MAX_PARTS);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_reported_per_file() {
        let storage = CosStorage::new(&config()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let batch = UploadBatch {
            files: vec![FileUpload {
                index: 0,
                path: std::path::PathBuf::from("/definitely/not/here.txt"),
                key: "here.txt".to_string(),
            }],
            slice_size: crate::config::SLICE_SIZE,
        };
        storage.upload_files(batch, tx).await.unwrap();
        let mut finished = Vec::new();
        while let Some(event) = rx.recv().await {
            if let TransferEvent::FileFinished { index, result } = event {
                finished.push((index, result));
            }
        }
        assert_eq!(finished.len(), 1);
        assert!(matches!(finished[0].1, Err(TransferError::Read { .. })));
    }
}
