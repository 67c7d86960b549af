mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    commands::{Command, execute_command},
    settings::Settings,
};

#[derive(Parser)]
#[command(version, about = "CLI client for the Express swap backend", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "express.conf")]
    config: PathBuf,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = settings::load(cli.settings, &cli.config)?;

    // Logs go to stderr, stdout carries the JSON output
    tracing_subscriber::registry()
        .with(EnvFilter::new(&settings.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    debug!("Using backend {}", settings.api_config().base_url);

    execute_command(cli.command, &settings).await
}
