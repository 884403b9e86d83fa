//! Tencent Cloud CDN API client (API 3.0, TC3-HMAC-SHA256)

use super::{CdnApi, CdnError, CdnTask, PurgeUrlsCacheRequest, PushUrlsCacheRequest};
use crate::config::CdnCredentials;
use crate::error::{CliError, Result};
use crate::sign::Tc3;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_VERSION: &str = "2018-06-06";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// CDN client for one set of credentials
#[derive(Debug, Clone)]
pub struct TencentCdn {
    http: Client,
    signer: Tc3,
    endpoint: String,
    region: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    response: ApiResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiResponse {
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    request_id: String,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    message: String,
}

impl TencentCdn {
    /// Build a client from CDN credentials
    pub fn new(credentials: &CdnCredentials, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CliError::Storage(format!("failed to create CDN client: {e}")))?;

        let endpoint = credentials
            .endpoint
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            signer: Tc3::new(&credentials.secret_id, &credentials.secret_key, "cdn"),
            endpoint,
            region: credentials.region.clone(),
        })
    }

    async fn call<T: Serialize + Sync>(&self, action: &str, request: &T) -> std::result::Result<CdnTask, CdnError> {
        let payload = serde_json::to_vec(request).map_err(|e| CdnError::InvalidResponse(e.to_string()))?;
        let now = Utc::now();
        let authorization = self
            .signer
            .authorization(&self.endpoint, CONTENT_TYPE, &payload, now)
            .map_err(|e| CdnError::Signing(e.to_string()))?;

        let mut builder = self
            .http
            .post(format!("https://{}/", self.endpoint))
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", &self.endpoint)
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", now.timestamp().to_string())
            .header("X-TC-Version", API_VERSION);
        if !self.region.is_empty() {
            builder = builder.header("X-TC-Region", &self.region);
        }

        tracing::debug!(action, endpoint = %self.endpoint, "calling CDN API");
        let response = builder
            .body(payload)
            .send()
            .await
            .map_err(|e| CdnError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CdnError::Network(e.to_string()))?;
        parse_response(status.as_u16(), &body)
    }
}

/// Task from a response body; API errors arrive with HTTP 200
fn parse_response(status: u16, body: &str) -> std::result::Result<CdnTask, CdnError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| CdnError::InvalidResponse(format!("HTTP {status}: {e}")))?;
    let response = envelope.response;
    if let Some(error) = response.error {
        return Err(CdnError::Api {
            code: error.code,
            message: error.message,
            request_id: response.request_id,
        });
    }
    Ok(CdnTask {
        task_id: response.task_id,
        request_id: response.request_id,
    })
}

#[async_trait]
impl CdnApi for TencentCdn {
    async fn purge_urls_cache(&self, request: PurgeUrlsCacheRequest) -> std::result::Result<CdnTask, CdnError> {
        self.call("PurgeUrlsCache", &request).await
    }

    async fn push_urls_cache(&self, request: PushUrlsCacheRequest) -> std::result::Result<CdnTask, CdnError> {
        self.call("PushUrlsCache", &request).await
    }
}
