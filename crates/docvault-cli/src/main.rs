#![warn(missing_docs)]

//! `docvault` binary entry point.

use anyhow::Result;
use clap::Parser;
use docvault_cli::cli::{load_config, Cli};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config.log_level, cli.json_logs);

    tracing::debug!(config = %cli.config.display(), "configuration loaded");
    cli.run(config).await
}
