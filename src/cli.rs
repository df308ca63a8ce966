use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "faqharvest", about = "Sitemap-rooted single-site crawler & FAQ harvester")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl the configured site until the frontier drains or an interrupt
    /// arrives. Safe to re-run: the registry resumes where it stopped.
    Crawl,
    /// Emit JSONL/CSV exports from the registry
    Export {
        /// Output directory (defaults to storage.export_dir from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show crawl progress and registry stats
    Status,
    /// Parse and type-check the configuration
    Validate,
}
