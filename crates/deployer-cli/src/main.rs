#![warn(clippy::all, clippy::pedantic)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deployer_core::config::ProjectConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::{DeployArgs, LinksArgs, NetworkArgs, VerifyArgs};

/// Deploy contracts and confirm their transactions.
#[derive(Parser, Debug)]
#[command(name = "deployer", version, about = "Deploy contracts and confirm their transactions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    network: NetworkArgs,

    /// Directory containing deployer.toml
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a contract's constructor payload and wait for the verdict
    Deploy(DeployArgs),
    /// Poll an address until its deployment is confirmed or failed
    Verify(VerifyArgs),
    /// Print explorer links for an address or transaction
    Links(LinksArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    logging_init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => tracing::debug!("no .env file found"),
        Err(err) => anyhow::bail!("could not load .env file: {err}"),
    }

    let cli = Cli::parse();
    let config = ProjectConfig::load(&cli.project).with_context(|| {
        format!("failed to load project config from {}", cli.project.display())
    })?;

    match cli.command {
        Commands::Deploy(args) => commands::deploy(&cli.network, config, &args).await,
        Commands::Verify(args) => commands::verify(&cli.network, config, &args).await,
        Commands::Links(args) => commands::links(&cli.network, config, &args).await,
    }
}

fn logging_init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
