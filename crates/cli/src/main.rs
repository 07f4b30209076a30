//! carelead CLI entry point

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod args;
mod commands;
mod config;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --log-level beats [general] log_level; RUST_LOG beats both
    let log_level = cli.log_level.clone().unwrap_or_else(|| {
        crate::config::AppConfig::load(cli.config.as_deref())
            .map(|c| c.general.log_level)
            .unwrap_or_else(|_| "info".to_string())
    });
    init_logging(&log_level)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
        Commands::Score(args) => commands::score::execute(args, cli.config).await,
        Commands::Outreach(args) => commands::outreach::execute(args, cli.config).await,
        Commands::Leads(args) => commands::leads::execute(args, cli.config).await,
        Commands::Config(args) => commands::config::execute(args).await,
        Commands::Doctor(args) => commands::doctor::execute(args, cli.config).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
