use anyhow::Result;
use clap::Parser;
use std::path::Path;
use swapdesk::application::{Cli, CommandExecutor};
use swapdesk::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "Config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Priority: CLI args > Config file > Defaults
    let config_path = cli
        .config
        .clone()
        .or_else(|| Path::new(DEFAULT_CONFIG_PATH).exists().then(|| DEFAULT_CONFIG_PATH.to_string()));
    let mut config = match config_path {
        Some(path) => {
            info!("Loading config from {}", path);
            Config::from_file(path)?
        }
        None => Config::default(),
    };

    if let Some(rpc_url) = cli.rpc_url {
        config.network.rpc_url = rpc_url;
    }
    if let Some(chain_id) = cli.chain_id {
        config.network.chain_id = chain_id;
    }
    if let Some(data_dir) = cli.data_dir {
        config.tracker.data_dir = data_dir;
    }

    CommandExecutor::execute(cli.command, config).await?;
    Ok(())
}
