//! Harvest binary entrypoint.
//! Loads the config, runs the pipeline once, and exits non-zero when the
//! history store (or the config) is unusable. Scheduling is left to cron/systemd.

mod cli;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use news_sitemap_harvester::ingest::fetch::HttpFetcher;
use news_sitemap_harvester::metrics::Metrics;
use news_sitemap_harvester::{HarvestConfig, Pipeline};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::Cli;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = match &cli.config {
        Some(path) => HarvestConfig::load_from(path)?,
        None => HarvestConfig::load_default()?,
    };

    let metrics = match &cli.metrics_file {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    let fetcher = HttpFetcher::new(cfg.timeout(), cfg.retry_policy())
        .context("building http client")?;
    let pipeline = Pipeline::from_config(&cfg, Box::new(fetcher))?.only_sources(&cli.sources)?;

    let summary = pipeline.run_once(Utc::now()).await?;

    for s in &summary.sources {
        if s.ok {
            info!(source = %s.name, records = s.records, dropped = s.dropped, "source ok");
        } else {
            warn!(source = %s.name, "source failed");
        }
    }
    for d in &summary.diagnostics {
        warn!(source = %d.source, stage = %d.stage, url = %d.url, cause = %d.cause, "diagnostic");
    }

    if let (Some(m), Some(path)) = (&metrics, &cli.metrics_file) {
        if let Err(e) = m.write_snapshot(path) {
            warn!(error = ?e, "metrics snapshot not written");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "harvest run aborted");
            ExitCode::FAILURE
        }
    }
}
