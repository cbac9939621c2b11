//! CLI application for the MEV Shield service.

use alloy::primitives::{Address, U256};
use clap::{Args, Parser, Subcommand};
use mev_shield::metrics_server::start_metrics_server;
use mev_shield::service::{Service, ServiceConfig};
use mev_shield_heuristics::ClassifierConfig;
use mev_shield_ingestion::{LedgerClient, RpcClient, Schedule, WalkerConfig};
use mev_shield_scanner::{ContractScanner, ScanOptions, ScannerConfig};
use mev_shield_telemetry::{init_logging, LogFormat, Metrics};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const GWEI: u128 = 1_000_000_000;

#[derive(Parser)]
#[command(name = "mev-shield")]
#[command(about = "MEV detection, contract risk scanning and real-time protection alerts")]
struct Cli {
    /// Log filter, e.g. "info" or "mev_shield_scanner=debug"
    #[arg(long, env = "MEV_SHIELD_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Log line format: json or pretty
    #[arg(long, env = "MEV_SHIELD_LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LedgerArgs {
    /// Ethereum execution RPC URL
    #[arg(long, env = "ETH_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Endpoint tried when a call to the primary fails
    #[arg(long, env = "ETH_FALLBACK_RPC_URL")]
    fallback_rpc_url: Option<String>,

    /// Per-call RPC timeout in seconds
    #[arg(long, env = "ETH_RPC_TIMEOUT_SECS", default_value = "10")]
    rpc_timeout_secs: u64,
}

#[derive(Args)]
struct ThresholdArgs {
    /// Arbitrage gas price floor in gwei (exclusive)
    #[arg(long, env = "MEV_SHIELD_HIGH_GAS_GWEI", default_value = "30")]
    high_gas_gwei: u64,

    /// Arbitrage value floor in wei (exclusive)
    #[arg(long, env = "MEV_SHIELD_VALUE_THRESHOLD_WEI", default_value = "1000000000000000000")]
    value_threshold_wei: u128,

    /// ETH price in USD used for profit estimates
    #[arg(long, env = "MEV_SHIELD_REFERENCE_PRICE_USD", default_value = "3000")]
    reference_price_usd: Decimal,

    /// Drop classifications estimated below this profit
    #[arg(long, env = "MEV_SHIELD_MIN_PROFIT_USD", default_value = "0")]
    min_profit_usd: Decimal,

    /// Bytecode size above which a contract is flagged as gas-inefficient
    #[arg(long, env = "MEV_SHIELD_GAS_SIZE_THRESHOLD", default_value = "2500")]
    gas_size_threshold: usize,

    /// Blocks inspected by the scanner's mempool report
    #[arg(long, env = "MEV_SHIELD_MEMPOOL_LOOKBACK", default_value = "5")]
    mempool_lookback_blocks: u64,
}

impl ThresholdArgs {
    fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            high_gas_threshold: u128::from(self.high_gas_gwei) * GWEI,
            value_threshold: U256::from(self.value_threshold_wei),
            reference_price_usd: self.reference_price_usd,
            min_profit_usd: self.min_profit_usd,
            ..Default::default()
        }
    }

    fn scanner(&self) -> ScannerConfig {
        ScannerConfig {
            gas_size_threshold: self.gas_size_threshold,
            mempool_lookback_blocks: self.mempool_lookback_blocks,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the block walker and protection monitor
    Run {
        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Blocks behind the head where walking starts
        #[arg(long, env = "MEV_SHIELD_WALKER_WINDOW", default_value = "10")]
        walker_window: u64,

        /// Maximum blocks walked per tick
        #[arg(long, env = "MEV_SHIELD_WALKER_BATCH", default_value = "5")]
        walker_batch: u64,

        /// Seconds between block walks
        #[arg(long, env = "MEV_SHIELD_WALKER_PERIOD_SECS", default_value = "30")]
        walker_period_secs: u64,

        /// Seconds before the first block walk
        #[arg(long, env = "MEV_SHIELD_WALKER_DELAY_SECS", default_value = "10")]
        walker_initial_delay_secs: u64,

        /// Seconds between protection sweeps
        #[arg(long, env = "MEV_SHIELD_SWEEP_PERIOD_SECS", default_value = "10")]
        sweep_period_secs: u64,

        /// Metrics bind address
        #[arg(long, env = "MEV_SHIELD_METRICS_ADDR", default_value = "0.0.0.0:9090")]
        metrics_bind_address: String,
    },
    /// Scan one contract and print the result as JSON
    Scan {
        #[command(flatten)]
        ledger: LedgerArgs,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Contract address
        address: Address,

        /// Include the gas report
        #[arg(long)]
        gas: bool,

        /// Skip the mempool report
        #[arg(long)]
        no_mempool: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_format)?;

    match cli.command {
        Commands::Run {
            ledger,
            thresholds,
            walker_window,
            walker_batch,
            walker_period_secs,
            walker_initial_delay_secs,
            sweep_period_secs,
            metrics_bind_address,
        } => {
            let sweep_period = Duration::from_secs(sweep_period_secs);
            let config = ServiceConfig {
                walker: WalkerConfig {
                    window: walker_window,
                    batch: walker_batch,
                    period: Duration::from_secs(walker_period_secs),
                    initial_delay: Duration::from_secs(walker_initial_delay_secs),
                },
                classifier: thresholds.classifier(),
                scanner: thresholds.scanner(),
                sweep: Schedule::every(sweep_period).with_initial_delay(sweep_period),
            };
            run(&ledger, config, &metrics_bind_address).await?;
        }
        Commands::Scan {
            ledger,
            thresholds,
            address,
            gas,
            no_mempool,
        } => {
            let options = ScanOptions {
                include_gas_analysis: gas,
                include_mempool_analysis: !no_mempool,
            };
            scan(&ledger, thresholds.scanner(), address, options).await?;
        }
    }

    Ok(())
}

fn connect(args: &LedgerArgs, metrics: Metrics) -> anyhow::Result<Arc<dyn LedgerClient>> {
    let client = RpcClient::new(
        &args.rpc_url,
        args.fallback_rpc_url.as_deref(),
        Duration::from_secs(args.rpc_timeout_secs),
        metrics,
    )?;
    Ok(Arc::new(client))
}

async fn run(ledger: &LedgerArgs, config: ServiceConfig, metrics_addr: &str) -> anyhow::Result<()> {
    info!("Starting MEV Shield");

    let metrics = Metrics::new()?;
    let ledger = connect(ledger, metrics.clone())?;
    match ledger.get_latest_block_number().await {
        Ok(latest) => info!("Ledger reachable, head at block {}", latest),
        Err(e) => warn!("Ledger not reachable yet ({}), background tasks will retry", e),
    }

    let service = Service::new(ledger, config, metrics.clone());
    start_metrics_server(metrics_addr, metrics).await?;
    service.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    service.shutdown().await;
    Ok(())
}

async fn scan(
    ledger: &LedgerArgs,
    config: ScannerConfig,
    address: Address,
    options: ScanOptions,
) -> anyhow::Result<()> {
    let metrics = Metrics::new()?;
    let ledger = connect(ledger, metrics.clone())?;
    let scanner = ContractScanner::new(ledger, config, metrics);

    let record = scanner.scan_now(address, options).await;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
