//! Pool API client
//!
//! The Umbrel pool app exposes:
//! - GET /api/pool/workers - Per-worker details under `workers_details`
//! - GET /api/pool - Pool-wide stats (network difficulty, height, ETA)

use crate::extract::{self, JsonObject};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use std::time::Duration;
use thiserror::Error;

pub const WORKERS_PATH: &str = "/api/pool/workers";
pub const POOL_STATS_PATH: &str = "/api/pool";

/// Cookie the Umbrel app proxy expects
const PROXY_TOKEN_COOKIE: &str = "UMBREL_PROXY_TOKEN";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("API connection failed: {0}")]
    ConnectionFailed(String),

    #[error("API request failed: HTTP {status}")]
    Upstream { status: u16 },

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type PoolResult<T> = Result<T, PoolError>;

/// One entry of `workers_details`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Worker name as reported, usually `<address>.<worker>`
    pub raw_name: String,
    pub best_ever: Option<u64>,
    pub last_share_ago_secs: Option<u64>,
}

impl WorkerSnapshot {
    pub fn from_json(obj: &JsonObject) -> Self {
        Self {
            raw_name: extract::text_field(obj, "workername").unwrap_or_default(),
            best_ever: extract::u64_field(obj, "bestever"),
            last_share_ago_secs: extract::u64_field(obj, "lastshare_ago_s"),
        }
    }
}

/// Pool-wide context included in alerts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSnapshot {
    pub network_difficulty: Option<f64>,
    pub network_height: Option<String>,
    pub eta_text: Option<String>,
}

impl PoolSnapshot {
    pub fn from_json(obj: &JsonObject) -> Self {
        Self {
            network_difficulty: extract::f64_field(obj, "network_difficulty"),
            network_height: extract::text_field(obj, "network_height"),
            eta_text: extract::text_field(obj, "eta_text"),
        }
    }
}

/// Worker entries of a workers response; non-object entries are skipped
pub fn workers_from_response(body: &JsonObject) -> Vec<WorkerSnapshot> {
    extract::list_field(body, "workers_details")
        .iter()
        .filter_map(|item| item.as_object())
        .map(WorkerSnapshot::from_json)
        .collect()
}

/// Source of worker and pool data
#[async_trait]
pub trait PoolSource: Send + Sync {
    /// Get per-worker details
    async fn fetch_workers(&self, base_url: &str) -> PoolResult<Vec<WorkerSnapshot>>;

    /// Get pool-wide statistics
    async fn fetch_pool_stats(&self, base_url: &str) -> PoolResult<PoolSnapshot>;
}

/// HTTP client for the Umbrel pool app API
pub struct UmbrelPoolApi {
    client: reqwest::Client,
    proxy_token: Option<String>,
}

impl UmbrelPoolApi {
    pub fn new(proxy_token: Option<String>) -> PoolResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            proxy_token: proxy_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_json(&self, base_url: &str, path: &str) -> PoolResult<JsonObject> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);

        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if let Some(ref token) = self.proxy_token {
            request = request.header(COOKIE, format!("{}={}", PROXY_TOKEN_COOKIE, token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PoolError::Upstream {
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PoolError::ConnectionFailed(e.to_string()))?;
        let value = serde_json::from_slice(&body).map_err(|e| PoolError::ParseError(e.to_string()))?;

        Ok(extract::into_object(value))
    }
}

#[async_trait]
impl PoolSource for UmbrelPoolApi {
    async fn fetch_workers(&self, base_url: &str) -> PoolResult<Vec<WorkerSnapshot>> {
        let body = self.get_json(base_url, WORKERS_PATH).await?;
        Ok(workers_from_response(&body))
    }

    async fn fetch_pool_stats(&self, base_url: &str) -> PoolResult<PoolSnapshot> {
        let body = self.get_json(base_url, POOL_STATS_PATH).await?;
        Ok(PoolSnapshot::from_json(&body))
    }
}
