//! Storage client configuration

use super::defaults::{self, COS_HOST_SUFFIX};
use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};

/// One COS bucket the tool can upload to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Display name used by `client list`
    #[serde(default)]
    pub name: String,

    /// Only enabled clients take part in uploads
    #[serde(default)]
    pub enable: bool,

    /// Bucket name including the APPID suffix, e.g. `assets-1250000000`
    pub bucket: String,

    /// Bucket region, e.g. `ap-guangzhou`
    pub region: String,

    /// API secret id
    #[serde(default)]
    pub secret_id: String,

    /// API secret key
    #[serde(default)]
    pub secret_key: String,

    /// Overrides the bucket endpoint (e.g. a global acceleration domain)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::default_timeout")]
    pub timeout_secs: u64,

    /// Files transferred at once
    #[serde(default = "defaults::default_parallelism")]
    pub parallelism: usize,

    /// CDN bound to the bucket
    #[serde(default)]
    pub cdn: Option<CdnBinding>,
}

/// CDN acceleration domain bound to a bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnBinding {
    /// Accelerated domain the uploaded files are served from
    pub domain: String,

    /// Separate credentials for the CDN API
    #[serde(default)]
    pub config: Option<CdnCredentials>,
}

/// Credentials and endpoint for the CDN API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnCredentials {
    /// API secret id
    pub secret_id: String,

    /// API secret key
    pub secret_key: String,

    /// API region, empty for the CDN service
    #[serde(default)]
    pub region: String,

    /// API endpoint host
    #[serde(default = "default_cdn_endpoint")]
    pub endpoint: String,
}

fn default_cdn_endpoint() -> String {
    defaults::CDN_API_ENDPOINT.to_string()
}

impl ClientConfig {
    /// Public domain used when no usable CDN is bound
    #[must_use]
    pub fn default_domain(&self) -> String {
        format!("{}.cos.{}.{COS_HOST_SUFFIX}", self.bucket, self.region)
    }

    /// CDN domain and credentials, when the binding is usable
    ///
    /// A binding is usable when its domain is a valid host name and there
    /// are credentials either on the binding or on the client itself.
    #[must_use]
    pub fn cdn_credentials(&self) -> Option<(&str, CdnCredentials)> {
        let cdn = self.cdn.as_ref()?;
        if !is_valid_domain(&cdn.domain) {
            tracing::warn!(domain = %cdn.domain, "ignoring CDN binding with an invalid domain");
            return None;
        }
        let credentials = match &cdn.config {
            Some(config) => config.clone(),
            None if !self.secret_id.is_empty() && !self.secret_key.is_empty() => CdnCredentials {
                secret_id: self.secret_id.clone(),
                secret_key: self.secret_key.clone(),
                region: String::new(),
                endpoint: default_cdn_endpoint(),
            },
            None => {
                tracing::warn!(domain = %cdn.domain, "ignoring CDN binding without credentials");
                return None;
            }
        };
        Some((cdn.domain.as_str(), credentials))
    }

    /// Validate an enabled client
    pub fn validate(&self) -> Result<()> {
        let label = if self.name.is_empty() {
            self.bucket.as_str()
        } else {
            self.name.as_str()
        };
        if self.bucket.is_empty() {
            return Err(CliError::InvalidConfig(format!(
                "client {label:?}: bucket cannot be empty"
            )));
        }
        if self.region.is_empty() {
            return Err(CliError::InvalidConfig(format!(
                "client {label:?}: region cannot be empty"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(CliError::InvalidConfig(format!(
                "client {label:?}: timeout_secs must be greater than 0"
            )));
        }
        if self.parallelism == 0 {
            return Err(CliError::InvalidConfig(format!(
                "client {label:?}: parallelism must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Copy with every secret replaced, for display
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.secret_key = mask(&copy.secret_key);
        if let Some(credentials) = copy.cdn.as_mut().and_then(|cdn| cdn.config.as_mut()) {
            credentials.secret_key = mask(&credentials.secret_key);
        }
        copy
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

/// Host name check for CDN domains: no wildcards, no scheme, at least two labels
#[must_use]
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.chars().count() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}
