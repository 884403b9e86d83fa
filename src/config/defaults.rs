//! Default configuration values

/// Config file looked up in the home and working directories
pub const CONFIG_FILE_NAME: &str = "cos.config.toml";

/// Host suffix of default bucket domains
pub const COS_HOST_SUFFIX: &str = "myqcloud.com";

/// Tencent Cloud API endpoint for CDN operations
pub const CDN_API_ENDPOINT: &str = "cdn.tencentcloudapi.com";

/// Stem length used when `rename = true`
pub const DEFAULT_RENAME_LENGTH: usize = 16;

/// Files above this size are uploaded in parts (50 MiB)
pub const SLICE_SIZE: u64 = 50 * 1024 * 1024;

/// Part size for multipart uploads (8 MiB)
pub const PART_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum URLs per CDN purge request
pub const PURGE_BATCH_SIZE: usize = 1000;

/// Maximum URLs per CDN push request
pub const PUSH_BATCH_SIZE: usize = 20;

/// Default request timeout in seconds
pub const fn default_timeout() -> u64 {
    300 // 5 minutes
}

/// Default number of files transferred at once
pub fn default_parallelism() -> usize {
    num_cpus::get().clamp(2, 8)
}
