//! Configuration management for the wallet loader.
//!
//! Supports loading from environment variables and TOML config files. The
//! resulting [`PipelineConfig`] is built once at startup and passed by
//! reference to every component.

use crate::ethereum::{parse_wallets, AddressError, WalletAddress};
use crate::schemas::{SortOrder, TransferKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Explorer API settings
    #[serde(default)]
    pub explorer: ExplorerConfig,

    /// AWS session, bucket and staging prefix
    #[serde(default)]
    pub aws: AwsConfig,

    /// Warehouse connection and target tables
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Row normalization settings
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Wallets to extract, processed in this order
    #[serde(default = "default_wallets")]
    pub wallets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Explorer host; requests go to `<base_url>/api`
    #[serde(default = "default_explorer_url")]
    pub base_url: String,

    /// API key. When unset it is read from the secret store.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Secret holding `{"apiKey": "..."}`
    #[serde(default = "default_api_key_secret_id")]
    pub api_key_secret_id: String,

    #[serde(default)]
    pub start_block: u64,

    #[serde(default = "default_end_block")]
    pub end_block: u64,

    /// Records per page (`offset`); a shorter page ends pagination
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default)]
    pub sort: SortOrder,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base_url: default_explorer_url(),
            api_key: None,
            api_key_secret_id: default_api_key_secret_id(),
            start_block: 0,
            end_block: default_end_block(),
            page_size: default_page_size(),
            sort: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Named profile that always wins over the default chain
    #[serde(default)]
    pub profile: Option<String>,

    /// Profile tried when the default chain resolves no credentials
    #[serde(default = "default_fallback_profile")]
    pub fallback_profile: Option<String>,

    /// Staging bucket
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Key prefix for staged files
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            profile: None,
            fallback_profile: default_fallback_profile(),
            bucket: default_bucket(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Secret holding host, username, password and the COPY role ARN
    #[serde(default = "default_credentials_secret_id")]
    pub credentials_secret_id: String,

    #[serde(default = "default_dbname")]
    pub dbname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default = "default_native_table")]
    pub native_table: String,

    #[serde(default = "default_token_table")]
    pub token_table: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            credentials_secret_id: default_credentials_secret_id(),
            dbname: default_dbname(),
            port: default_port(),
            schema: default_schema(),
            native_table: default_native_table(),
            token_table: default_token_table(),
        }
    }
}

impl WarehouseConfig {
    /// Target table for a transfer kind
    pub fn table_for(&self, kind: TransferKind) -> &str {
        match kind {
            TransferKind::Native => &self.native_table,
            TransferKind::Token => &self.token_table,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Label written to `currency` on native rows
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Label written to `fee_currency` on native rows
    #[serde(default = "default_fee_currency")]
    pub fee_currency: String,

    #[serde(default)]
    pub on_malformed_record: MalformedRecordPolicy,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            fee_currency: default_fee_currency(),
            on_malformed_record: MalformedRecordPolicy::default(),
        }
    }
}

/// What to do with a record that is missing a field or has an unparseable one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRecordPolicy {
    /// Log a warning and drop the record
    #[default]
    Skip,
    /// Fail the run
    Abort,
}

// Default value functions
fn default_explorer_url() -> String {
    "https://api.polygonscan.com".to_string()
}

fn default_api_key_secret_id() -> String {
    "prod-datalake-polygonscan-apiKey".to_string()
}

fn default_end_block() -> u64 {
    99_999_999
}

fn default_page_size() -> usize {
    10_000
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_fallback_profile() -> Option<String> {
    Some("datalake_prod_operator".to_string())
}

fn default_bucket() -> String {
    "datalake-prod-backend-data-extract".to_string()
}

fn default_key_prefix() -> String {
    "polygonscan".to_string()
}

fn default_credentials_secret_id() -> String {
    "redshift/credentials".to_string()
}

fn default_dbname() -> String {
    "prod".to_string()
}

fn default_port() -> u16 {
    5439
}

fn default_schema() -> String {
    "polygonscan".to_string()
}

fn default_native_table() -> String {
    "wallet_txs".to_string()
}

fn default_token_table() -> String {
    "wallet_token_txs".to_string()
}

fn default_currency() -> String {
    "Kasta".to_string()
}

fn default_fee_currency() -> String {
    "MATIC".to_string()
}

fn default_wallets() -> Vec<String> {
    [
        "0x7695ea9a311bca3e49b19807e25a88a7d7505cf6",
        "0x05247f858e4bbebc4412294acb5afcaa00524a1b",
        "0x0501FB0476873785aeEd434903f8eB27f6433698",
        "0xc82257b574e576052b42884953a861fcc5b80f29",
        "0xac08c80cb31c1879faefd19050bf93f0a3bf3755",
        "0x5e1551f6d9dd3a25b09ef2af2532516f83fc7a82",
        "0x68e0669ea4e10dd08d2e79b15e2d0f01b8c608c5",
        "0xeeb6fd17507de21c9d3e376c5aaa270990c332bd",
        "0x5b5e5037c1d4d6695d264b6d6f0de29b2b3726d3",
        "0x1ec0aC2250261d0E2ee28F63E8253E8D2322383C",
        "0x885880a80f18c2e5739d110b7f4a0a788ff73d34",
        "0x8a79526f7a59a56cd5a4166731e54f7e06c9d223",
        "0xaa05c398958a22efcd88790f25164255d56b11ed",
        "0x3c00B2c1DC76B33A7BfFFFDd6AAACDd0055e9685",
        "0x629E717C10Be98307259fD9eE13f26B20cD98b57",
        "0xf089b4c6c57Ff9ad6c5E6f48b64Cf5e316Ab3aa3",
        "0x6fCc0Ed62478fDb19b5F1f26f08d0e377Ca1681A",
        "0xBf65adf16eC4ceE19E149561eD37Fb62cB800471",
        "0x243E5DA8aD52bEfd23A8E7A438e13BbEDFC9fd84",
        "0x2470c7B3f86521747FF351F7b570ff098b901088",
        "0x381013772192BaFF4Ee886AaabD4e80764b6058e",
        "0x5F08f5843E86eb4E69341427f1d53F3d30d1f527",
        "0x74f25c18577C73A71dABBd1EC6fdA8810a47DDC6",
        "0x9F3060cA34A748c6cB265B0250251e58e40DF9BC",
        "0xe8A4e027E746031DEd5A60572f614f8E9b0ca9Eb",
        "0xc5b34400df3b99277ff39a8d25a2b6e21b5cc980",
        "0xb11f1f578ae23f5b9c0bede271a1f73b1e38f3ec",
        "0x5564509044abae6503599e52496b859b9dfd41cd",
        "0xb8a8c2f377f82cd041cd97b45c1a1dc2db7238ed",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            explorer: ExplorerConfig::default(),
            aws: AwsConfig::default(),
            warehouse: WarehouseConfig::default(),
            normalize: NormalizeConfig::default(),
            wallets: default_wallets(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ::toml::from_str(&contents)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    // Environment variables override file settings
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("POLYGONSCAN_API_KEY") {
            if !key.is_empty() {
                self.explorer.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("POLYGONSCAN_BASE_URL") {
            self.explorer.base_url = url;
        }
        if let Ok(profile) = std::env::var("AWS_PROFILE") {
            self.aws.profile = Some(profile);
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.aws.region = region;
        }
        if let Ok(bucket) = std::env::var("S3_BUCKET") {
            self.aws.bucket = bucket;
        }
        if let Ok(wallets) = std::env::var("WALLET_ADDRESSES") {
            let parsed: Vec<String> = wallets
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            if !parsed.is_empty() {
                self.wallets = parsed;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.wallets.is_empty() {
            anyhow::bail!("wallets must not be empty");
        }
        if self.explorer.page_size == 0 {
            anyhow::bail!("explorer.page_size must be > 0");
        }
        if self.explorer.start_block > self.explorer.end_block {
            anyhow::bail!(
                "explorer.start_block ({}) is after explorer.end_block ({})",
                self.explorer.start_block,
                self.explorer.end_block
            );
        }
        self.wallet_addresses()?;
        Ok(())
    }

    /// Configured wallets as validated addresses, in configured order
    pub fn wallet_addresses(&self) -> Result<Vec<WalletAddress>, AddressError> {
        parse_wallets(&self.wallets)
    }
}
