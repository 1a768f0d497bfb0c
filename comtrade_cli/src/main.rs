mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use comtrade_lib::config::DEFAULT_CONFIG_FILE;
use comtrade_lib::{CachedClient, ComtradeConfig};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "comtrade")]
#[command(about = "Query, cache and rank UN Comtrade trade data")]
struct Cli {
    /// Output format: table, json, csv, md
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Config file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cache and support directories and a config template
    Setup,
    /// Fetch final trade data
    Fetch(Box<commands::fetch::FetchArgs>),
    /// Rank commodities per reporter, year and flow
    TopCommodities(Box<commands::leaderboards::TopCommoditiesArgs>),
    /// Rank partners per reporter, year and flow
    TopPartners(Box<commands::leaderboards::TopPartnersArgs>),
    /// Yearly imports, exports and balance, with mirror flows
    TradeFlows(commands::trade_flows::TradeFlowsArgs),
    /// Remove expired cache entries, or list or wipe the cache
    CleanCache(commands::clean_cache::CleanCacheArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("comtrade=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.output)?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = ComtradeConfig::load(Some(&config_path))?;

    match &cli.command {
        Commands::Setup => commands::setup::run(&config, &config_path)?,
        Commands::CleanCache(args) => commands::clean_cache::run(args, &config, &format)?,
        command => run_remote(command, &config, &format).await?,
    }

    Ok(())
}

/// Commands that talk to the service share one client, and so one rate
/// limiter and request tracker.
async fn run_remote(command: &Commands, config: &ComtradeConfig, format: &OutputFormat) -> Result<()> {
    let client = CachedClient::new(config)?;
    match command {
        Commands::Fetch(args) => commands::fetch::run(args, &client, config, format).await,
        Commands::TopCommodities(args) => {
            commands::leaderboards::run_top_commodities(args, &client, config, format).await
        }
        Commands::TopPartners(args) => {
            commands::leaderboards::run_top_partners(args, &client, config, format).await
        }
        Commands::TradeFlows(args) => commands::trade_flows::run(args, &client, config, format).await,
        Commands::Setup | Commands::CleanCache(_) => Ok(()),
    }
}
