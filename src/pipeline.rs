//! Fetch, normalize, stage and load for one transfer kind.
//!
//! Wallets are processed strictly in configured order. A wallet whose fetch
//! fails is skipped and the run continues; everything after fetching fails
//! the run. An empty batch ends the run successfully without touching object
//! storage or the warehouse.

use crate::aws::AwsContext;
use crate::batch::{Batch, BatchError};
use crate::config::PipelineConfig;
use crate::ethereum::{AddressError, WalletAddress};
use crate::explorer::{ExplorerApi, FetchError, PolygonscanClient};
use crate::fetch_transactions::{FetchParams, PageFetcher};
use crate::normalizer::{NormalizeError, RecordNormalizer};
use crate::schemas::TransferKind;
use crate::secrets::{explorer_api_key, AwsSecretsManager, SecretError, SecretStore};
use crate::staging::{ObjectStore, S3ObjectStore, StagingError, StagingLoader};
use crate::warehouse::{Redshift, Warehouse, WarehouseError, WarehouseLoader};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid wallet address: {0}")]
    Address(#[from] AddressError),

    #[error("Explorer client error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),
}

/// What happened to one wallet during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressOutcome {
    Fetched { records: usize, rows: usize },
    NoTransfers,
    /// Fetch failed at the transport level; nothing from this wallet is loaded
    Skipped { reason: String },
}

#[derive(Debug, Clone)]
pub struct AddressReport {
    pub address: String,
    pub outcome: AddressOutcome,
}

/// Terminal state of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Loaded { object_key: String, rows: usize },
    /// Nothing accumulated; staging and loading were skipped
    Empty,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub kind: TransferKind,
    pub addresses: Vec<AddressReport>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn rows_loaded(&self) -> usize {
        match &self.outcome {
            RunOutcome::Loaded { rows, .. } => *rows,
            RunOutcome::Empty => 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.addresses
            .iter()
            .filter(|a| matches!(a.outcome, AddressOutcome::Skipped { .. }))
            .count()
    }
}

/// External systems the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub explorer: Arc<dyn ExplorerApi>,
    pub objects: Arc<dyn ObjectStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub warehouse: Arc<dyn Warehouse>,
}

impl Collaborators {
    /// Production wiring: Polygonscan over HTTP, S3, Secrets Manager, Redshift
    pub fn from_aws(config: &PipelineConfig, aws: &AwsContext) -> Result<Self, PipelineError> {
        Ok(Self {
            explorer: Arc::new(PolygonscanClient::new(&config.explorer.base_url)?),
            objects: Arc::new(S3ObjectStore::new(aws.s3())),
            secrets: Arc::new(AwsSecretsManager::new(aws.secrets_manager())),
            warehouse: Arc::new(Redshift::new(
                &config.warehouse.dbname,
                config.warehouse.port,
            )),
        })
    }
}

/// Explorer API key: the configured value, else the secret store.
pub async fn resolve_api_key(
    config: &PipelineConfig,
    secrets: &dyn SecretStore,
) -> Result<String, SecretError> {
    match &config.explorer.api_key {
        Some(key) => Ok(key.clone()),
        None => explorer_api_key(secrets, &config.explorer.api_key_secret_id).await,
    }
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    wallets: Vec<WalletAddress>,
    api_key: String,
    params: FetchParams,
    fetcher: PageFetcher,
    normalizer: RecordNormalizer,
    stager: StagingLoader,
    loader: WarehouseLoader,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        api_key: String,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        let wallets = config.wallet_addresses()?;

        Ok(Self {
            config,
            wallets,
            api_key,
            params: FetchParams::from_config(&config.explorer),
            fetcher: PageFetcher::new(collaborators.explorer),
            normalizer: RecordNormalizer::new(&config.normalize),
            stager: StagingLoader::new(
                collaborators.objects,
                &config.aws.bucket,
                &config.aws.key_prefix,
            ),
            loader: WarehouseLoader::new(
                collaborators.secrets,
                collaborators.warehouse,
                &config.warehouse.credentials_secret_id,
                &config.aws.bucket,
            ),
        })
    }

    /// Replace the clock used for staging keys
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.stager = self.stager.with_clock(clock);
        self
    }

    /// Fetch, normalize and accumulate every wallet's transfers of `kind`.
    pub async fn collect(
        &self,
        kind: TransferKind,
    ) -> Result<(Batch, Vec<AddressReport>), PipelineError> {
        let mut batch = Batch::new(kind);
        let mut reports = Vec::with_capacity(self.wallets.len());

        for wallet in &self.wallets {
            let address = wallet.as_str();
            info!("Fetching {} transfers for wallet: {}", kind, address);

            let outcome = match self
                .fetcher
                .try_fetch(address, &self.api_key, kind, &self.params)
                .await
            {
                Err(e) => {
                    error!("Error fetching {} transfers for wallet {}: {}", kind, address, e);
                    AddressOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Ok(records) if records.is_empty() => {
                    warn!("No {} transfers for wallet: {}", kind, address);
                    AddressOutcome::NoTransfers
                }
                Ok(records) => {
                    let rows = self.normalizer.normalize(&records, address, kind)?;
                    let row_count = rows.len();
                    let total = batch.append(rows)?;
                    debug!("Batch now holds {} {} rows", total, kind);
                    AddressOutcome::Fetched {
                        records: records.len(),
                        rows: row_count,
                    }
                }
            };

            reports.push(AddressReport {
                address: address.to_string(),
                outcome,
            });
        }

        Ok((batch, reports))
    }

    /// Run the whole pipeline once for `kind`.
    pub async fn run(&self, kind: TransferKind) -> Result<RunReport, PipelineError> {
        let (batch, addresses) = self.collect(kind).await?;

        let skipped = addresses
            .iter()
            .filter(|a| matches!(a.outcome, AddressOutcome::Skipped { .. }))
            .count();
        if skipped > 0 {
            warn!("{} of {} wallets skipped after fetch errors", skipped, addresses.len());
        }

        if batch.is_empty() {
            info!("No {} transfers to load", kind);
            return Ok(RunReport {
                kind,
                addresses,
                outcome: RunOutcome::Empty,
            });
        }

        let schema = &self.config.warehouse.schema;
        let table = self.config.warehouse.table_for(kind);
        info!(
            "Preparing to upload {} {} rows to S3 and then to {}.{}",
            batch.len(),
            kind,
            schema,
            table
        );

        let object_key = self.stager.stage(&batch, table).await?;
        self.loader.load(&object_key, schema, table).await?;

        info!("{} rows loaded into {}.{}", batch.len(), schema, table);
        Ok(RunReport {
            kind,
            addresses,
            outcome: RunOutcome::Loaded {
                object_key,
                rows: batch.len(),
            },
        })
    }

    /// Run each kind in turn; the first failure stops the remaining kinds.
    pub async fn run_kinds(&self, kinds: &[TransferKind]) -> Result<Vec<RunReport>, PipelineError> {
        let mut reports = Vec::with_capacity(kinds.len());
        for kind in kinds {
            reports.push(self.run(*kind).await?);
        }
        Ok(reports)
    }
}

/// Direct entry point: build the production collaborators and run once.
pub async fn run_pipeline(
    config: &PipelineConfig,
    kinds: &[TransferKind],
) -> Result<Vec<RunReport>, PipelineError> {
    let aws = AwsContext::load(&config.aws).await;
    let collaborators = Collaborators::from_aws(config, &aws)?;
    let api_key = resolve_api_key(config, collaborators.secrets.as_ref()).await?;
    info!("Explorer API key set");

    Pipeline::new(config, api_key, collaborators)?
        .run_kinds(kinds)
        .await
}

/// Event-triggered entry point. The payload is not inspected.
pub async fn handle_event(
    event: &serde_json::Value,
    config: &PipelineConfig,
) -> Result<Vec<RunReport>, PipelineError> {
    debug!("Ignoring event payload: {}", event);
    run_pipeline(config, &TransferKind::ALL).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        native_record, ok_page, token_record, MemoryObjectStore, RecordingWarehouse,
        ScriptedExplorer, StaticSecrets, CREDENTIALS_JSON,
    };
    use std::sync::atomic::{AtomicI64, Ordering};

    const WALLET_A: &str = "0x7695ea9a311bca3e49b19807e25a88a7d7505cf6";
    const WALLET_B: &str = "0x0501FB0476873785aeEd434903f8eB27f6433698";

    struct Harness {
        config: PipelineConfig,
        explorer: Arc<ScriptedExplorer>,
        objects: Arc<MemoryObjectStore>,
        warehouse: Arc<RecordingWarehouse>,
    }

    impl Harness {
        fn new(wallets: &[&str]) -> Self {
            let mut config = PipelineConfig::default();
            config.wallets = wallets.iter().map(|s| s.to_string()).collect();
            config.explorer.page_size = 2;
            config.aws.bucket = "bucket".to_string();
            Self {
                config,
                explorer: Arc::new(ScriptedExplorer::new()),
                objects: Arc::new(MemoryObjectStore::new()),
                warehouse: Arc::new(RecordingWarehouse::new()),
            }
        }

        fn collaborators(&self) -> Collaborators {
            Collaborators {
                explorer: self.explorer.clone(),
                objects: self.objects.clone(),
                secrets: Arc::new(
                    StaticSecrets::new().with("redshift/credentials", CREDENTIALS_JSON),
                ),
                warehouse: self.warehouse.clone(),
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            let tick = Arc::new(AtomicI64::new(1_700_000_000));
            Pipeline::new(&self.config, "KEY".to_string(), self.collaborators())
                .unwrap()
                .with_clock(move || tick.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn test_single_page_rows_carry_fetch_address() {
        let harness = Harness::new(&[WALLET_B]);
        let mut record = native_record("0x1", "1000000000000000000");
        record.from = Some("0xsomeoneelse".to_string());
        harness.explorer.push_page(WALLET_B, vec![record]);

        let report = harness.pipeline().run(TransferKind::Native).await.unwrap();

        assert_eq!(report.rows_loaded(), 1);
        let objects = harness.objects.objects();
        let csv = String::from_utf8(objects[0].2.clone()).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with(&format!("{},0x1,", WALLET_B)));
        assert!(row.contains(",1.0,"));
    }

    #[tokio::test]
    async fn test_multi_page_wallets_accumulate_in_order() {
        let harness = Harness::new(&[WALLET_A, WALLET_B]);
        harness.explorer.push_page(WALLET_A, ok_page(2));
        harness.explorer.push_page(WALLET_A, ok_page(1));
        harness.explorer.push_page(WALLET_B, ok_page(1));

        let (batch, reports) = harness.pipeline().collect(TransferKind::Native).await.unwrap();

        assert_eq!(batch.len(), 4);
        let owners: Vec<_> = batch.rows().iter().map(|r| r.wallet_address()).collect();
        assert_eq!(owners, vec![WALLET_A, WALLET_A, WALLET_A, WALLET_B]);
        assert_eq!(
            reports[0].outcome,
            AddressOutcome::Fetched { records: 3, rows: 3 }
        );
        assert_eq!(harness.explorer.requested_pages(WALLET_A), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_wallet_is_skipped_and_run_loads() {
        let harness = Harness::new(&[WALLET_A, WALLET_B]);
        harness.explorer.push_error(WALLET_A, "connection refused");
        harness.explorer.push_page(WALLET_B, ok_page(1));

        let report = harness.pipeline().run(TransferKind::Native).await.unwrap();

        assert!(matches!(report.outcome, RunOutcome::Loaded { rows: 1, .. }));
        assert!(matches!(
            report.addresses[0].outcome,
            AddressOutcome::Skipped { .. }
        ));
        assert_eq!(report.skipped(), 1);
        assert_eq!(harness.warehouse.statements().len(), 1);

        let csv = String::from_utf8(harness.objects.objects()[0].2.clone()).unwrap();
        assert!(csv.lines().skip(1).all(|l| l.starts_with(WALLET_B)));
    }

    #[tokio::test]
    async fn test_empty_run_skips_staging_and_load() {
        let harness = Harness::new(&[WALLET_A, WALLET_B]);
        harness
            .explorer
            .push_status(WALLET_A, "0", "No transactions found");

        let report = harness.pipeline().run(TransferKind::Token).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Empty);
        assert!(report
            .addresses
            .iter()
            .all(|a| a.outcome == AddressOutcome::NoTransfers));
        assert!(harness.objects.objects().is_empty());
        assert!(harness.warehouse.statements().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_stages_and_loads_again() {
        let harness = Harness::new(&[WALLET_A]);
        harness.explorer.push_page(WALLET_A, ok_page(1));
        harness.explorer.push_page(WALLET_A, ok_page(1));

        let pipeline = harness.pipeline();
        let first = pipeline.run(TransferKind::Native).await.unwrap();
        let second = pipeline.run(TransferKind::Native).await.unwrap();

        let key = |r: &RunReport| match &r.outcome {
            RunOutcome::Loaded { object_key, .. } => object_key.clone(),
            RunOutcome::Empty => panic!("expected a load"),
        };
        assert_ne!(key(&first), key(&second));
        assert_eq!(harness.objects.objects().len(), 2);
        assert_eq!(harness.warehouse.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_token_run_targets_token_table() {
        let harness = Harness::new(&[WALLET_A]);
        harness
            .explorer
            .push_page(WALLET_A, vec![token_record("0x1", "500000", "6")]);

        let report = harness.pipeline().run(TransferKind::Token).await.unwrap();

        match report.outcome {
            RunOutcome::Loaded { object_key, rows } => {
                assert_eq!(object_key, "polygonscan/wallet_token_txs_1700000000.csv");
                assert_eq!(rows, 1);
            }
            RunOutcome::Empty => panic!("expected a load"),
        }
        let statements = harness.warehouse.statements();
        assert!(statements[0].starts_with("COPY polygonscan.wallet_token_txs "));
        assert_eq!(
            harness.explorer.requests()[0]
                .iter()
                .find(|(k, _)| *k == "action")
                .map(|(_, v)| v.as_str()),
            Some("tokentx")
        );
    }

    #[tokio::test]
    async fn test_copy_failure_fails_run_and_leaves_object() {
        let mut harness = Harness::new(&[WALLET_A]);
        harness.warehouse = Arc::new(RecordingWarehouse::failing("Load into table failed"));
        harness.explorer.push_page(WALLET_A, ok_page(1));

        let err = harness.pipeline().run(TransferKind::Native).await.unwrap_err();

        assert!(matches!(err, PipelineError::Warehouse(_)));
        assert_eq!(harness.objects.objects().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_run_before_staging() {
        let mut harness = Harness::new(&[WALLET_A]);
        harness.config.normalize.on_malformed_record = crate::config::MalformedRecordPolicy::Abort;
        let mut broken = native_record("0x1", "1");
        broken.time_stamp = None;
        harness.explorer.push_page(WALLET_A, vec![broken]);

        let err = harness.pipeline().run(TransferKind::Native).await.unwrap_err();

        assert!(matches!(err, PipelineError::Normalize(_)));
        assert!(harness.objects.objects().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_api_key_prefers_config() {
        let mut config = PipelineConfig::default();
        let secrets = StaticSecrets::new()
            .with("prod-datalake-polygonscan-apiKey", r#"{"apiKey": "FROM_SECRET"}"#);

        assert_eq!(resolve_api_key(&config, &secrets).await.unwrap(), "FROM_SECRET");

        config.explorer.api_key = Some("FROM_ENV".to_string());
        assert_eq!(resolve_api_key(&config, &secrets).await.unwrap(), "FROM_ENV");
    }
}
