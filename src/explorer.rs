//! Polygonscan account API client.
//!
//! One GET per page against `<base_url>/api?module=account`. No timeout, rate
//! limiting or retry is layered on top of the HTTP client: a failed request is
//! reported to the caller as-is.

use crate::schemas::{ExplorerResponse, SortOrder, TransferKind};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Query for a single page of one address's transfer list.
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub address: &'a str,
    pub api_key: &'a str,
    pub kind: TransferKind,
    pub start_block: u64,
    pub end_block: u64,
    /// 1-based page number
    pub page: u32,
    /// Records per page, sent as `offset`
    pub page_size: usize,
    pub sort: SortOrder,
}

impl PageRequest<'_> {
    /// Query string pairs in the order the explorer documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("module", "account".to_string()),
            ("action", self.kind.action().to_string()),
            ("address", self.address.to_string()),
            ("startblock", self.start_block.to_string()),
            ("endblock", self.end_block.to_string()),
            ("page", self.page.to_string()),
            ("offset", self.page_size.to_string()),
            ("sort", self.sort.as_str().to_string()),
            ("apikey", self.api_key.to_string()),
        ]
    }
}

/// Source of explorer pages.
#[async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Fetch one page. Errors are transport-level only; an API-level failure
    /// comes back as a response with a non-success status.
    async fn get_page(&self, request: &PageRequest<'_>) -> Result<ExplorerResponse, FetchError>;
}

/// reqwest-backed explorer client
pub struct PolygonscanClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PolygonscanClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("polygon-wallet-loader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ExplorerApi for PolygonscanClient {
    async fn get_page(&self, request: &PageRequest<'_>) -> Result<ExplorerResponse, FetchError> {
        debug!(
            "GET {} action={} address={} page={} offset={}",
            self.endpoint,
            request.kind.action(),
            request.address,
            request.page,
            request.page_size
        );

        let response = self
            .client
            .get(&self.endpoint)
            .query(&request.query_pairs())
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
