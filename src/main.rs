//! Polygon Wallet Transfer Loader CLI
//!
//! Fetches wallet transfers from Polygonscan and loads them into the
//! warehouse through an S3 staging object.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use polygon_wallet_loader::aws::AwsContext;
use polygon_wallet_loader::config::PipelineConfig;
use polygon_wallet_loader::pipeline::{
    handle_event, resolve_api_key, run_pipeline, AddressOutcome, Collaborators, Pipeline,
    RunOutcome, RunReport,
};
use polygon_wallet_loader::schemas::TransferKind;
use polygon_wallet_loader::staging::write_csv;
use polygon_wallet_loader::warehouse::copy_statement;

#[derive(Parser)]
#[command(name = "polygon-wallet-loader")]
#[command(author = "Data Platform Team")]
#[command(version)]
#[command(about = "Polygonscan wallet transfer extraction into Redshift", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses env vars if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Native,
    Token,
    All,
}

impl KindArg {
    fn kinds(self) -> Vec<TransferKind> {
        match self {
            KindArg::Native => vec![TransferKind::Native],
            KindArg::Token => vec![TransferKind::Token],
            KindArg::All => TransferKind::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SingleKindArg {
    Native,
    Token,
}

impl From<SingleKindArg> for TransferKind {
    fn from(arg: SingleKindArg) -> Self {
        match arg {
            SingleKindArg::Native => TransferKind::Native,
            SingleKindArg::Token => TransferKind::Token,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, stage and load transfers for every configured wallet
    Run {
        /// Transfer kind to process
        #[arg(short, long, value_enum, default_value = "all")]
        kind: KindArg,
    },

    /// Event-triggered run; the event payload is read but not used
    HandleEvent {
        /// JSON event file (empty event if omitted)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Fetch and normalize, then write the CSV locally instead of loading
    Export {
        #[arg(short, long, value_enum)]
        kind: SingleKindArg,

        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the COPY statement for a staged object
    CopySql {
        #[arg(short, long, value_enum)]
        kind: SingleKindArg,

        /// Object key inside the configured bucket
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::load().context("Failed to load config from environment")?,
    };

    match cli.command {
        Commands::Run { kind } => {
            cmd_run(&config, &kind.kinds()).await?;
        }
        Commands::HandleEvent { event } => {
            cmd_handle_event(&config, event.as_ref()).await?;
        }
        Commands::Export { kind, output } => {
            cmd_export(&config, kind.into(), &output).await?;
        }
        Commands::CopySql { kind, key } => {
            cmd_copy_sql(&config, kind.into(), &key);
        }
    }

    Ok(())
}

async fn cmd_run(config: &PipelineConfig, kinds: &[TransferKind]) -> Result<()> {
    info!("=== Running Wallet Transfer Pipeline ===");
    info!("Wallets: {}", config.wallets.len());

    let reports = run_pipeline(config, kinds)
        .await
        .context("Pipeline run failed")?;

    print_summary(&reports);
    Ok(())
}

async fn cmd_handle_event(config: &PipelineConfig, event_path: Option<&PathBuf>) -> Result<()> {
    info!("=== Handling Event ===");

    let event: serde_json::Value = match event_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read event file {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse event file {:?}", path))?
        }
        None => serde_json::Value::Object(Default::default()),
    };

    let reports = handle_event(&event, config)
        .await
        .context("Event-triggered run failed")?;

    print_summary(&reports);
    Ok(())
}

async fn cmd_export(config: &PipelineConfig, kind: TransferKind, output: &PathBuf) -> Result<()> {
    info!("=== Exporting {} transfers ===", kind);

    let aws = AwsContext::load(&config.aws).await;
    let collaborators = Collaborators::from_aws(config, &aws)?;
    let api_key = resolve_api_key(config, collaborators.secrets.as_ref())
        .await
        .context("Failed to resolve explorer API key")?;

    let pipeline = Pipeline::new(config, api_key, collaborators)?;
    let (batch, addresses) = pipeline.collect(kind).await?;

    if batch.is_empty() {
        warn!("No {} transfers found; writing header-less empty file", kind);
    }

    let file = File::create(output)
        .with_context(|| format!("Failed to create output file {:?}", output))?;
    write_csv(&batch, BufWriter::new(file)).context("Failed to write CSV")?;

    let skipped = addresses
        .iter()
        .filter(|a| matches!(a.outcome, AddressOutcome::Skipped { .. }))
        .count();
    info!(
        "Exported {} rows from {} wallets ({} skipped) to {:?}",
        batch.len(),
        addresses.len(),
        skipped,
        output
    );

    Ok(())
}

fn cmd_copy_sql(config: &PipelineConfig, kind: TransferKind, key: &str) {
    let sql = copy_statement(
        &config.warehouse.schema,
        config.warehouse.table_for(kind),
        &config.aws.bucket,
        key,
        "<service_role>",
    );
    println!("{}", sql);
}

fn print_summary(reports: &[RunReport]) {
    info!("=== Pipeline Complete ===");

    for report in reports {
        for address in &report.addresses {
            match &address.outcome {
                AddressOutcome::Fetched { records, rows } => {
                    info!(
                        "  {} {}: {} records, {} rows",
                        report.kind, address.address, records, rows
                    );
                }
                AddressOutcome::NoTransfers => {
                    info!("  {} {}: no transfers", report.kind, address.address);
                }
                AddressOutcome::Skipped { reason } => {
                    warn!("  {} {}: skipped ({})", report.kind, address.address, reason);
                }
            }
        }

        match &report.outcome {
            RunOutcome::Loaded { object_key, rows } => {
                info!("{}: {} rows loaded from {}", report.kind, rows, object_key);
            }
            RunOutcome::Empty => {
                info!("{}: nothing to load", report.kind);
            }
        }
    }
}
