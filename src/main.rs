use clap::Parser;
use loyalty_engine::application::pipeline::{Pipeline, PipelineConfig};
use loyalty_engine::domain::ports::{LedgerRef, OracleRef};
use loyalty_engine::infrastructure::accrual::HttpAccrualClient;
use loyalty_engine::infrastructure::in_memory::InMemoryLedger;
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the accrual service
    #[arg(short = 'r', long, default_value = "http://localhost:8080")]
    accrual_address: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<std::path::PathBuf>,

    /// Seconds between pending-order polls
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// Number of accrual workers
    #[arg(long, default_value_t = 5)]
    workers: usize,
}

#[cfg(feature = "storage-rocksdb")]
fn build_ledger(cli: &Cli) -> Result<LedgerRef> {
    use loyalty_engine::infrastructure::rocksdb::RocksDbLedger;

    if let Some(path) = &cli.db_path {
        // A ledger that cannot be opened is fatal: nothing works without it.
        let ledger = RocksDbLedger::open(path).into_diagnostic()?;
        info!(path = %path.display(), "using RocksDB ledger");
        Ok(Arc::new(ledger))
    } else {
        info!("using in-memory ledger");
        Ok(Arc::new(InMemoryLedger::new()))
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn build_ledger(_cli: &Cli) -> Result<LedgerRef> {
    info!("using in-memory ledger");
    Ok(Arc::new(InMemoryLedger::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let cli = Cli::parse();

    let ledger = build_ledger(&cli)?;
    let oracle: OracleRef = Arc::new(
        HttpAccrualClient::new(cli.accrual_address.clone()).into_diagnostic()?,
    );

    let config = PipelineConfig {
        poll_interval: Duration::from_secs(cli.poll_interval),
        workers: cli.workers,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let pipeline = Pipeline::spawn(ledger, oracle, config, cancel.clone());
    info!(
        accrual = cli.accrual_address,
        workers = cli.workers,
        "accrual pipeline started"
    );

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    info!("shutting down");
    cancel.cancel();
    pipeline.shutdown().await;

    Ok(())
}
