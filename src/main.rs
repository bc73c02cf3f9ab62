//! `switchboard` binary: run the configured channel adapters.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use switchboard::{bootstrap, config, credentials, logging};

/// Omnichannel chat router.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start every enabled adapter and route messages until Ctrl-C.
    Start {
        /// Config file. Defaults to `~/.switchboard/switchboard.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Credentials file. Defaults to `~/.switchboard/.env`.
        #[arg(long)]
        env: Option<PathBuf>,
    },
    /// Validate configuration and print the router status as JSON.
    Check {
        /// Config file. Defaults to `~/.switchboard/switchboard.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Credentials file. Defaults to `~/.switchboard/.env`.
        #[arg(long)]
        env: Option<PathBuf>,
    },
}

fn resolve(
    path: Option<PathBuf>,
    default: fn() -> anyhow::Result<PathBuf>,
) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => default(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Start { config, env } => start(config, env).await,
        Command::Check { config, env } => check(config, env),
    }
}

async fn start(config_path: Option<PathBuf>, env_path: Option<PathBuf>) -> anyhow::Result<()> {
    let _guard = logging::init_production(&config::logs_dir()?)?;

    let config_path = resolve(config_path, config::default_config_path)?;
    let env_path = resolve(env_path, config::default_env_path)?;
    let config = config::load_config(&config_path)?;
    let credentials = credentials::load_credentials(&env_path)?;

    let router = bootstrap::build_router(&config, &credentials)?;
    if router.channel_names().is_empty() {
        anyhow::bail!("no channels enabled in {}", config_path.display());
    }

    router.start().await.context("failed to start router")?;
    info!(channels = ?router.channel_names(), "switchboard running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    router.stop().await;
    Ok(())
}

fn check(config_path: Option<PathBuf>, env_path: Option<PathBuf>) -> anyhow::Result<()> {
    logging::init_cli();

    let config_path = resolve(config_path, config::default_config_path)?;
    let env_path = resolve(env_path, config::default_env_path)?;
    let config = config::load_config(&config_path)?;
    let credentials = credentials::load_credentials(&env_path)?;

    let router = bootstrap::build_router(&config, &credentials)?;
    let status = serde_json::to_string_pretty(&router.status())?;
    println!("{status}");
    Ok(())
}
