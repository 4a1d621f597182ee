//! Polygon Wallet Transfer Loader Library
//!
//! Extracts the transfer history of a fixed set of Polygon wallets from the
//! Polygonscan account API and bulk-loads it into the Redshift warehouse.
//!
//! # Pipeline Stages
//!
//! 1. **Fetching** ([`fetch_transactions`]): Walks every page of a wallet's native or token transfer list
//! 2. **Normalization** ([`normalizer`]): Converts raw records into warehouse rows with exact decimal amounts
//! 3. **Accumulation** ([`batch`]): Collects all wallets' rows for one run
//! 4. **Staging** ([`staging`]): Writes the batch as a single CSV object to S3
//! 5. **Loading** ([`warehouse`]): Issues a `COPY` from the staged object into the target table
//!
//! # Target Tables
//!
//! - `polygonscan.wallet_txs`: Native transfers
//! - `polygonscan.wallet_token_txs`: ERC-20 token transfers
//!
//! # Example
//!
//! ```no_run
//! use polygon_wallet_loader::config::PipelineConfig;
//! use polygon_wallet_loader::pipeline::run_pipeline;
//! use polygon_wallet_loader::schemas::TransferKind;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load()?;
//!     let reports = run_pipeline(&config, &TransferKind::ALL).await?;
//!     for report in reports {
//!         println!("{}: {} rows loaded", report.kind, report.rows_loaded());
//!     }
//!     Ok(())
//! }
//! ```

pub mod aws;
pub mod batch;
pub mod config;
pub mod ethereum;
pub mod explorer;
pub mod fetch_transactions;
pub mod normalizer;
pub mod pipeline;
pub mod schemas;
pub mod secrets;
pub mod staging;
pub mod warehouse;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use pipeline::{handle_event, run_pipeline, RunOutcome, RunReport};
pub use schemas::{NormalizedRow, TransferKind, TransferRecord};
