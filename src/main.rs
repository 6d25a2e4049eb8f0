//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `connectivity_tester` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger and configuration initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use connectivity_tester::config::{AppConfig, LogFormat, LogLevel, HTTP_TIMEOUT};
use connectivity_tester::initialization::{init_client, init_logger_with, init_resolver};
use connectivity_tester::models::NetworkType;
use connectivity_tester::prober::ExternalProber;
use connectivity_tester::provider::{new_provider, IpInfoClient, ProxySystem};
use connectivity_tester::storage::{init_db_pool_with_path, run_migrations, SqliteStore};
use connectivity_tester::{
    MeasurementEngine, Request, RetestSelection, ServerImporter, ServerRetester,
};

#[derive(Debug, Parser)]
#[command(name = "connectivity_tester", version, about)]
struct Cli {
    /// Configuration file (searched in the default locations when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file; overrides `database.path` from the configuration
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    #[arg(long, value_enum, default_value_t = LogFormat::Plain, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lease clients and measure every working server through them
    Measure(MeasureArgs),

    /// Import access links from a file, one per line
    AddServers {
        file: PathBuf,
        /// Name tag stored on every imported server
        name: Option<String>,
    },

    /// Probe stored servers directly and refresh their last known errors
    TestServers {
        /// Only servers with a TCP error other than a connect failure
        #[arg(long)]
        tcp: bool,
        /// Only servers with a UDP error
        #[arg(long)]
        udp: bool,
    },
}

#[derive(Debug, Args)]
struct MeasureArgs {
    /// ISO country code, e.g. `ir`
    country: String,
    network_type: NetworkType,
    #[arg(value_enum)]
    proxy: ProxySystem,
    /// Lease attempts per client
    max_retries: usize,
    /// Clients leased per ISP
    max_clients: usize,

    /// Only lease clients for this ISP
    #[arg(long)]
    isp: Option<String>,

    /// Measure only these servers (repeatable)
    #[arg(long = "server-id")]
    server_ids: Vec<i64>,

    /// Measure only servers with these name tags (repeatable)
    #[arg(long = "server-name")]
    server_names: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry vendor credentials
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logger_with(cli.log_level.into(), cli.log_format)
        .context("Failed to initialize logger")?;

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    if let Some(db_path) = cli.db_path {
        config.database.path = db_path;
    }

    let result = match cli.command {
        Command::Measure(args) => measure(&config, args).await,
        Command::AddServers { file, name } => add_servers(&config, file, name).await,
        Command::TestServers { tcp, udp } => {
            test_servers(&config, RetestSelection { tcp, udp }).await
        }
    };

    if let Err(e) = result {
        eprintln!("connectivity_tester error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    let pool = init_db_pool_with_path(&config.database.path)
        .await
        .context("Failed to open database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn measure(config: &AppConfig, args: MeasureArgs) -> Result<()> {
    let store = open_store(config).await?;
    let provider = new_provider(
        config.provider_config(args.proxy, args.network_type),
        args.network_type,
    )
    .with_context(|| format!("Failed to set up provider {}", args.proxy))?;
    let prober = Arc::new(ExternalProber::from_settings(&config.connectivity));

    let engine = MeasurementEngine::new(store, provider, prober, config.measurement_config());
    let request = Request {
        country: args.country,
        isp: args.isp,
        network_type: args.network_type,
        server_ids: args.server_ids,
        server_names: args.server_names,
        max_retries: args.max_retries,
        max_clients: args.max_clients,
    };

    let outcome = tokio::select! {
        result = engine.run(&request) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, stopping measurement");
            None
        }
    };
    engine.shutdown().await;

    match outcome {
        Some(Ok(report)) => {
            println!(
                "✅ Leased {} of {} client{} across {} ISP{} via {}: {} jobs ({} failed) in {:.1}s",
                report.clients_leased,
                report.lease_attempts,
                if report.lease_attempts == 1 { "" } else { "s" },
                report.isps,
                if report.isps == 1 { "" } else { "s" },
                report.provider,
                report.jobs_dispatched,
                report.job_errors,
                report.elapsed_seconds
            );
            println!("Results saved in {}", config.database.path.display());
            Ok(())
        }
        Some(Err(e)) => Err(e).context("Measurement run failed"),
        None => Ok(()),
    }
}

async fn add_servers(config: &AppConfig, file: PathBuf, name: Option<String>) -> Result<()> {
    let store = open_store(config).await?;
    let resolver = init_resolver().context("Failed to initialize DNS resolver")?;
    let ipinfo =
        IpInfoClient::new(config.ipinfo_config()).context("Failed to create ipinfo client")?;
    let http = init_client(HTTP_TIMEOUT).context("Failed to create HTTP client")?;

    let importer = ServerImporter::new(store, resolver, Some(ipinfo), http);
    let summary = importer
        .import_file(&file, name.as_deref())
        .await
        .with_context(|| format!("Failed to import servers from {}", file.display()))?;

    println!(
        "✅ Imported {} server{} from {} link{} ({} failed)",
        summary.servers,
        if summary.servers == 1 { "" } else { "s" },
        summary.links,
        if summary.links == 1 { "" } else { "s" },
        summary.failed_links
    );
    Ok(())
}

async fn test_servers(config: &AppConfig, selection: RetestSelection) -> Result<()> {
    let store = open_store(config).await?;
    let prober = Arc::new(ExternalProber::from_settings(&config.connectivity));

    let summary = ServerRetester::new(store, prober, &config.measurement_config())
        .retest(selection)
        .await
        .context("Failed to load servers for retest")?;

    println!(
        "✅ Tested {} server{}: {} updated, {} removed ({} failed to save)",
        summary.tested,
        if summary.tested == 1 { "" } else { "s" },
        summary.updated,
        summary.removed,
        summary.errors
    );
    Ok(())
}
