//! BalanceWatch CLI
//!
//! Command-line interface for the BalanceWatch treasury monitor.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use balancewatch::alerting::{format_satcomma, AlertSink, LogSink, ThresholdEvaluator, WebhookSink};
use balancewatch::api::HttpServer;
use balancewatch::balance::BalanceAggregator;
use balancewatch::config::{LogFormat, ServerConfig};
use balancewatch::db::{MemorySnapshotStore, PostgresPool, PostgresSnapshotStore, SnapshotStore};
use balancewatch::models::{BalanceSnapshot, SnapshotKind};
use balancewatch::monitor::BalanceMonitor;
use balancewatch::sources::{EvmRpcWallet, SourceRegistry};
use balancewatch::Config;

/// BalanceWatch - Treasury balance monitoring
#[derive(Parser)]
#[command(name = "balancewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "BALANCEWATCH_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the balance monitor and HTTP API
    Serve {
        /// Keep snapshots in memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },

    /// Query stored balance snapshots
    Snapshots {
        #[command(subcommand)]
        command: SnapshotsCommands,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Validate and print the effective configuration
    CheckConfig,
}

#[derive(Subcommand)]
enum SnapshotsCommands {
    /// Show the newest snapshot
    Latest {
        /// Only consider snapshots of this kind (periodic, swap)
        #[arg(long)]
        kind: Option<SnapshotKind>,
    },

    /// List snapshots, newest first
    List {
        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: u32,

        /// Number of snapshots to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Only list snapshots of this kind (periodic, swap)
        #[arg(long)]
        kind: Option<SnapshotKind>,
    },

    /// Show the snapshot taken after a swap
    Swap {
        /// Swap ID
        swap_id: String,
    },

    /// Show snapshots within a time range, oldest first
    Range {
        /// Range start (RFC 3339), defaults to `--last` before the end
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Range end (RFC 3339), defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Range length when no start is given (e.g. "1h", "24h", "7d")
        #[arg(long, default_value = "24h")]
        last: String,

        /// Only show snapshots of this kind (periodic, swap)
        #[arg(long)]
        kind: Option<SnapshotKind>,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve { memory } => run_serve(config, memory).await,
        Commands::Snapshots { command } => run_snapshots(config, command, cli.format).await,
        Commands::Db { command } => run_db(config, command).await,
        Commands::CheckConfig => run_check_config(&config, cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn install_metrics_exporter(server: &ServerConfig) -> anyhow::Result<()> {
    let Some(port) = server.metrics_port else {
        return Ok(());
    };

    let addr: SocketAddr = format!("{}:{}", server.host, port)
        .parse()
        .with_context(|| format!("invalid metrics address {}:{}", server.host, port))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}

fn build_registry(config: &Config) -> anyhow::Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    for source in &config.sources.evm {
        let wallet = EvmRpcWallet::new(source, config.monitor.source_timeout)
            .with_context(|| format!("failed to set up EVM source for {}", source.symbol))?;
        registry.add_wallet(source.symbol.clone(), Arc::new(wallet));
    }

    if registry.is_empty() {
        warn!("No balance sources configured");
    }

    for threshold in &config.thresholds {
        if registry.get(&threshold.symbol).is_none() {
            warn!(symbol = %threshold.symbol, "Threshold configured for a symbol without sources");
        }
    }

    Ok(registry)
}

async fn connect_store(config: &Config) -> anyhow::Result<PostgresSnapshotStore> {
    let pool = PostgresPool::new(&config.database)
        .await
        .context("failed to connect to PostgreSQL")?;
    Ok(PostgresSnapshotStore::new(&pool))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down...");
}

async fn run_serve(config: Config, memory: bool) -> anyhow::Result<()> {
    install_metrics_exporter(&config.server)?;

    let store: Arc<dyn SnapshotStore> = if memory {
        warn!("Snapshots are kept in memory and lost on exit");
        Arc::new(MemorySnapshotStore::new())
    } else {
        let pool = PostgresPool::new(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?;
        pool.migrate().await.context("failed to run migrations")?;
        Arc::new(PostgresSnapshotStore::new(&pool))
    };

    let aggregator = BalanceAggregator::new(build_registry(&config)?, config.monitor.source_timeout);

    let sink: Arc<dyn AlertSink> = match WebhookSink::from_config(&config.alerting)? {
        Some(webhook) => Arc::new(webhook),
        None => {
            info!("No alert webhook configured, alerts are only logged");
            Arc::new(LogSink)
        }
    };
    let evaluator = Arc::new(ThresholdEvaluator::new(config.thresholds.clone(), Some(sink)));

    let monitor = Arc::new(BalanceMonitor::new(
        aggregator.clone(),
        evaluator,
        store.clone(),
        &config.monitor,
    ));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let monitor_task = tokio::spawn({
        let monitor = monitor.clone();
        async move { monitor.run(shutdown_rx).await }
    });

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let served = HttpServer::new(store, aggregator, Some(monitor))
        .serve(&addr, shutdown_signal())
        .await;

    // The monitor stops on either a signal or a failed server
    let _ = shutdown_tx.send(()).await;
    monitor_task.await?;

    served?;
    Ok(())
}

async fn run_snapshots(
    config: Config,
    command: SnapshotsCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let store = connect_store(&config).await?;

    match command {
        SnapshotsCommands::Latest { kind } => match store.get_latest(kind).await? {
            Some(snapshot) => print_snapshots(&[snapshot], format)?,
            None => println!("No snapshots found"),
        },
        SnapshotsCommands::List {
            limit,
            offset,
            kind,
        } => {
            let page = store.get_snapshots(limit, offset, kind).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
                OutputFormat::Text => {
                    print_snapshots(&page.snapshots, format)?;
                    println!("Showing {} of {} snapshots", page.snapshots.len(), page.total);
                }
            }
        }
        SnapshotsCommands::Swap { swap_id } => match store.get_by_swap_id(&swap_id).await? {
            Some(snapshot) => print_snapshots(&[snapshot], format)?,
            None => println!("No snapshot found for swap {swap_id}"),
        },
        SnapshotsCommands::Range {
            from,
            to,
            last,
            kind,
        } => {
            let to = to.unwrap_or_else(Utc::now);
            let from = match from {
                Some(from) => from,
                None => to - parse_last(&last)?,
            };
            anyhow::ensure!(from <= to, "range start {from} is after its end {to}");

            let snapshots = store.get_by_time_range(from, to, kind).await?;
            print_snapshots(&snapshots, format)?;
        }
    }

    Ok(())
}

fn parse_last(last: &str) -> anyhow::Result<chrono::Duration> {
    let duration: Duration = humantime::parse_duration(last)
        .with_context(|| format!("invalid duration {last:?}"))?;
    Ok(chrono::Duration::from_std(duration)?)
}

fn print_snapshots(snapshots: &[BalanceSnapshot], format: OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(snapshots)?);
        return Ok(());
    }

    for snapshot in snapshots {
        let origin = match (snapshot.swap_id(), snapshot.swap_type()) {
            (Some(swap_id), Some(swap_type)) => format!("{swap_type} swap {swap_id}"),
            _ => snapshot.kind().to_string(),
        };
        println!(
            "#{} {} ({})",
            snapshot.id,
            snapshot.timestamp.to_rfc3339(),
            origin
        );

        for wallet in &snapshot.balances.wallets {
            println!(
                "  {:<8} {:<12} wallet   {:>24}  unconfirmed {}",
                wallet.symbol,
                wallet.service,
                format_satcomma(i128::from(wallet.confirmed)),
                format_satcomma(i128::from(wallet.unconfirmed)),
            );
        }
        for ln in &snapshot.balances.lightning {
            println!(
                "  {:<8} {:<12} channels {:>24}  remote {}",
                ln.symbol,
                ln.service,
                format_satcomma(i128::from(ln.local)),
                format_satcomma(i128::from(ln.remote)),
            );
        }
    }

    Ok(())
}

async fn run_db(config: Config, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let pool = PostgresPool::new(&config.database)
                .await
                .context("failed to connect to PostgreSQL")?;
            pool.migrate().await?;
            println!("Migrations applied");
        }
    }

    Ok(())
}

fn run_check_config(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("Configuration is valid");
            println!(
                "  Snapshot interval: {}",
                humantime::format_duration(config.monitor.snapshot_interval)
            );
            println!(
                "  Source timeout:    {}",
                humantime::format_duration(config.monitor.source_timeout)
            );
            println!(
                "  HTTP API:          {}:{}",
                config.server.host, config.server.http_port
            );
            println!(
                "  Alert webhook:     {}",
                if config.alerting.webhook_url.is_some() {
                    "configured"
                } else {
                    "none (log only)"
                }
            );
            println!("  EVM sources:       {}", config.sources.evm.len());
            for threshold in &config.thresholds {
                println!(
                    "  {:<8} min wallet {} (main wallet: {})",
                    threshold.symbol,
                    format_satcomma(i128::from(threshold.min_wallet_balance)),
                    threshold.preferred_wallet()
                );
            }
        }
    }

    Ok(())
}
