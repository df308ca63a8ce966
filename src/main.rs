mod cli;
mod commands;
mod crawl;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use faqharvest_core::config::AppConfig;

use crate::cli::{Cli, Commands};
use crate::crawl::{run_crawl, EngineOutcome};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig =
        toml::from_str(&config_str).with_context(|| format!("invalid config {}", cli.config))?;

    match cli.command {
        Commands::Crawl => match run_crawl(config).await? {
            EngineOutcome::Done => {}
            EngineOutcome::Aborted => {
                // Conventional exit status for SIGINT termination.
                std::process::exit(130);
            }
        },
        Commands::Export { output } => {
            commands::export::run(config, output).await?;
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
        Commands::Validate => {
            commands::validate::run(&config)?;
        }
    }

    Ok(())
}
