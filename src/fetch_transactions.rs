//! Paginated transfer fetching for a single wallet.
//!
//! Walks `page = 1, 2, ...` until the explorer returns a page shorter than the
//! page size or reports a non-success status. A transport failure ends the
//! walk for that wallet only.

use crate::config::ExplorerConfig;
use crate::explorer::{ExplorerApi, FetchError, PageRequest};
use crate::schemas::{SortOrder, TransferKind, TransferRecord};
use std::sync::Arc;
use tracing::{error, info};

/// Block window, starting page, page size and ordering for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchParams {
    pub start_block: u64,
    pub end_block: u64,
    pub page: u32,
    pub page_size: usize,
    pub sort: SortOrder,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            start_block: 0,
            end_block: 99_999_999,
            page: 1,
            page_size: 10_000,
            sort: SortOrder::Asc,
        }
    }
}

impl FetchParams {
    pub fn from_config(config: &ExplorerConfig) -> Self {
        Self {
            start_block: config.start_block,
            end_block: config.end_block,
            page_size: config.page_size,
            sort: config.sort,
            ..Self::default()
        }
    }
}

/// Accumulates every page of one wallet's transfer list.
pub struct PageFetcher {
    api: Arc<dyn ExplorerApi>,
}

impl PageFetcher {
    pub fn new(api: Arc<dyn ExplorerApi>) -> Self {
        Self { api }
    }

    /// Fetch all transfers of `kind` for `address`.
    ///
    /// Transport failures are logged and yield an empty vector.
    pub async fn fetch(
        &self,
        address: &str,
        api_key: &str,
        kind: TransferKind,
        params: &FetchParams,
    ) -> Vec<TransferRecord> {
        match self.try_fetch(address, api_key, kind, params).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error fetching {} transfers for wallet {}: {}", kind, address, e);
                Vec::new()
            }
        }
    }

    /// Same walk as [`fetch`](Self::fetch), surfacing transport failures.
    pub async fn try_fetch(
        &self,
        address: &str,
        api_key: &str,
        kind: TransferKind,
        params: &FetchParams,
    ) -> Result<Vec<TransferRecord>, FetchError> {
        let mut records = Vec::new();
        let mut request = PageRequest {
            address,
            api_key,
            kind,
            start_block: params.start_block,
            end_block: params.end_block,
            page: params.page,
            page_size: params.page_size,
            sort: params.sort,
        };

        loop {
            let response = self.api.get_page(&request).await?;

            if !response.is_success() {
                // Also what the explorer answers for an empty or exhausted list
                info!(
                    "No more {} transfers for wallet {} at page {} ({})",
                    kind,
                    address,
                    request.page,
                    response.message.as_deref().unwrap_or("no message")
                );
                break;
            }

            let page_records = response.into_records()?;
            let page_count = page_records.len();
            records.extend(page_records);

            info!(
                "Fetched {} {} transfers for wallet: {}, Page: {}, Total so far: {}",
                page_count,
                kind,
                address,
                request.page,
                records.len()
            );

            if page_count < request.page_size {
                break;
            }
            request.page += 1;
        }

        info!(
            "Total {} transfers fetched for wallet {}: {}",
            kind,
            address,
            records.len()
        );
        Ok(records)
    }
}
