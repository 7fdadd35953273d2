mod config;
mod ethereum;
mod farm;
mod server;

use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use config::Config;
use ethereum::provider::HttpProvider;
use ethereum::receipt::Platform;
use farm::Farm;
use server::BaseRMcpServer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (important for MCP stdio servers)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("baser-mcp")
        .version("0.1.0")
        .about("MCP server for the BaseR pinger farm on Base")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("wallet-rpc-url")
                .short('w')
                .long("wallet-rpc-url")
                .value_name("URL")
                .help("Wallet provider JSON-RPC endpoint (must sign eth_sendTransaction)"),
        )
        .arg(
            Arg::new("public-rpc-url")
                .long("public-rpc-url")
                .value_name("URL")
                .help("Public RPC endpoint used for receipt polling"),
        )
        .arg(
            Arg::new("platform")
                .short('p')
                .long("platform")
                .value_name("PLATFORM")
                .value_parser(["desktop", "mobile"])
                .help("Wallet platform, selects the receipt wait strategy"),
        )
        .arg(
            Arg::new("enable-transactions")
                .long("enable-transactions")
                .help("Allow on-chain actions (deploy, farming, minting)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save-config")
                .long("save-config")
                .help("Write the effective configuration (file plus flags) to the config path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = match matches.get_one::<String>("config") {
        Some(path) => Some(path.into()),
        None => Config::default_config_path()
            .ok()
            .filter(|path| path.exists()),
    };
    let mut config = Config::load_or_default(config_path.clone()).await;

    if let Some(url) = matches.get_one::<String>("wallet-rpc-url") {
        config.wallet.rpc_url = url.clone();
    }

    if let Some(url) = matches.get_one::<String>("public-rpc-url") {
        config.receipts.public_rpc_url = url.clone();
    }

    if let Some(platform) = matches.get_one::<String>("platform") {
        config.receipts.platform = match platform.as_str() {
            "mobile" => Platform::Mobile,
            _ => Platform::Desktop,
        };
    }

    if matches.get_flag("enable-transactions") {
        config.farming.transactions_enabled = true;
    }

    if matches.get_flag("save-config") {
        let path = match config_path {
            Some(path) => path,
            None => Config::default_config_path()?,
        };
        config.save_to_file(&path).await?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    info!("Starting BaseR MCP Server");
    info!("Wallet provider: {}", config.wallet.rpc_url);
    info!("Public RPC: {}", config.receipts.public_rpc_url);
    info!("Receipt wait strategy: {:?}", config.wait_strategy());
    let timeout = Duration::from_secs(config.wallet.timeout_seconds);
    let wallet = HttpProvider::new(&config.wallet.rpc_url, timeout)
        .map_err(|e| anyhow!("Wallet provider: {}", e))?;
    match wallet.check_connection().await {
        Ok(chain_id) => info!("Wallet provider reachable, active chain {}", chain_id),
        Err(e) => warn!("{}; tools will fail until it is reachable", e),
    }
    let public = HttpProvider::new(&config.receipts.public_rpc_url, timeout)
        .map_err(|e| anyhow!("Public RPC: {}", e))?;

    let farm = Farm::new(&config, Arc::new(wallet), Arc::new(public))?;
    info!("Transactions enabled: {}", farm.transactions_enabled());
    let server = BaseRMcpServer::new(farm);

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
