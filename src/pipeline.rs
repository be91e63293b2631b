// src/pipeline.rs
//! One harvest run: every source through fetch → parse → normalize
//! (independently, optionally in parallel), then a single sequential
//! merge → save → partition → prune under exclusive ownership of the history.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::errors::StoreError;
use crate::history::{merge, HistoryStore};
use crate::ingest::fetch::FeedFetcher;
use crate::ingest::normalize::DropCounts;
use crate::ingest::types::{ArticleRecord, Source};
use crate::ingest::{ensure_metrics_described, harvest_source, ChildSitemapPolicy, Diagnostic};
use crate::partition::{dates_of_interest, partition, write_partitions};
use crate::rolling::{prune, RetentionPolicy};

pub use crate::ingest::SourceOutcome;

/// Per-source line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub ok: bool,
    pub records: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    pub new_records: usize,
    pub drops: DropCounts,
    /// History size after the run (after pruning in rolling mode).
    pub history_records: usize,
    pub partitions_written: usize,
    pub pruned: usize,
    /// False when no source produced data and the store was left alone.
    pub store_updated: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.ok).count()
    }
}

pub struct Pipeline {
    sources: Vec<Source>,
    fetcher: Box<dyn FeedFetcher>,
    store: HistoryStore,
    daily_dir: PathBuf,
    retention: RetentionPolicy,
    concurrency: usize,
    children: ChildSitemapPolicy,
}

impl Pipeline {
    pub fn new(
        sources: Vec<Source>,
        fetcher: Box<dyn FeedFetcher>,
        store: HistoryStore,
        daily_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            fetcher,
            store,
            daily_dir: daily_dir.into(),
            retention: RetentionPolicy::default(),
            concurrency: 1,
            children: ChildSitemapPolicy::default(),
        }
    }

    pub fn from_config(cfg: &HarvestConfig, fetcher: Box<dyn FeedFetcher>) -> Result<Self> {
        Ok(Self::new(
            cfg.resolve_sources()?,
            fetcher,
            HistoryStore::new(&cfg.history_path),
            &cfg.daily_dir,
        )
        .with_retention(cfg.retention_policy())
        .with_concurrency(cfg.fetch.concurrency)
        .with_child_policy(cfg.child_policy()))
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_child_policy(mut self, children: ChildSitemapPolicy) -> Self {
        self.children = children;
        self
    }

    /// Restrict the run to the named sources (case-insensitive).
    pub fn only_sources(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        for n in names {
            if !self.sources.iter().any(|s| s.name.eq_ignore_ascii_case(n)) {
                bail!("unknown source {n:?}");
            }
        }
        self.sources
            .retain(|s| names.iter().any(|n| s.name.eq_ignore_ascii_case(n)));
        Ok(self)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Run every source; results come back in configured order whatever the
    /// completion order, so later sources win URL conflicts deterministically.
    pub async fn harvest_all(&self) -> Vec<SourceOutcome> {
        stream::iter(self.sources.iter())
            .map(|source| harvest_source(self.fetcher.as_ref(), source, self.children))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Execute one run. Only store failures abort it.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary, StoreError> {
        ensure_metrics_described();
        info!(target: "harvest", sources = self.sources.len(), "harvest run starting");

        let outcomes = self.harvest_all().await;

        let mut summary = RunSummary::default();
        let mut new_records: Vec<ArticleRecord> = Vec::new();
        for outcome in outcomes {
            match outcome {
                SourceOutcome::Harvested {
                    source,
                    records,
                    drops,
                    warnings,
                } => {
                    summary.sources.push(SourceReport {
                        name: source,
                        ok: true,
                        records: records.len(),
                        dropped: drops.total(),
                    });
                    summary.drops.merge(&drops);
                    summary.diagnostics.extend(warnings);
                    new_records.extend(records);
                }
                SourceOutcome::Failed { source, diagnostic } => {
                    summary.sources.push(SourceReport {
                        name: source,
                        ok: false,
                        records: 0,
                        dropped: 0,
                    });
                    summary.diagnostics.push(diagnostic);
                }
            }
        }
        summary.new_records = new_records.len();
        gauge!("harvest_last_run_ts").set(now.timestamp() as f64);

        if new_records.is_empty() {
            warn!(
                target: "harvest",
                failed = summary.failed_sources(),
                "no data found from any source; history left untouched"
            );
            return Ok(summary);
        }

        let dates = dates_of_interest(new_records.iter());
        let existing = self.store.load()?;
        let before = existing.len();
        let merged = merge(existing, new_records);
        self.store.save(&merged)?;
        info!(
            target: "harvest",
            before,
            after = merged.len(),
            incoming = summary.new_records,
            "history merged"
        );

        let parts = partition(&merged, &dates);
        summary.partitions_written = write_partitions(&self.daily_dir, &parts)?;
        summary.store_updated = true;

        let history = match self.retention.max_age() {
            Some(max_age) => {
                let total = merged.len();
                let kept = prune(merged, now, max_age);
                summary.pruned = total - kept.len();
                if summary.pruned > 0 {
                    self.store.save(&kept)?;
                    counter!("harvest_pruned_total").increment(summary.pruned as u64);
                }
                kept
            }
            None => merged,
        };
        summary.history_records = history.len();
        gauge!("harvest_history_records").set(history.len() as f64);

        info!(
            target: "harvest",
            new = summary.new_records,
            history = summary.history_records,
            partitions = summary.partitions_written,
            pruned = summary.pruned,
            failed_sources = summary.failed_sources(),
            "harvest run finished"
        );
        Ok(summary)
    }
}
