//! Command-line interface of the `harvest` binary.

use clap::Parser;
use std::path::PathBuf;

/// Harvest publisher news sitemaps into the article history (one run).
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the harvest config (TOML or JSON)
    #[arg(short, long, env = "HARVEST_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Only harvest these sources (repeatable)
    #[arg(short, long = "source")]
    pub sources: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Write a Prometheus text snapshot here when the run ends
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}
