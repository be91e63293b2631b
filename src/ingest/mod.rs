// src/ingest/mod.rs
//! Per-source stage of a run: fetch → parse → normalize.
//!
//! Each source yields an owned [`SourceOutcome`]; nothing is shared between
//! sources until the pipeline reduces the outcomes into one batch.

pub mod fetch;
pub mod fixture;
pub mod normalize;
pub mod parse;
pub mod profiles;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::fmt;
use tracing::{info, warn};

use crate::errors::DropReason;
use crate::ingest::fetch::FeedFetcher;
use crate::ingest::normalize::{normalize_batch, DropCounts};
use crate::ingest::parse::parse_feed;
use crate::ingest::types::{ArticleRecord, RawEntry, Source};

/// One-time metrics registration (so series show up in the snapshot).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "harvest_records_total",
            "Records normalized per source in a run."
        );
        describe_counter!(
            "harvest_dropped_total",
            "Raw entries dropped during normalization, by reason."
        );
        describe_counter!(
            "harvest_source_errors_total",
            "Per-source fetch/parse failures, by stage."
        );
        describe_histogram!("harvest_fetch_ms", "Feed fetch time in milliseconds.");
        describe_gauge!(
            "harvest_history_records",
            "Records in the persisted history after the run."
        );
        describe_counter!(
            "harvest_pruned_total",
            "Records removed by rolling retention."
        );
        describe_gauge!(
            "harvest_last_run_ts",
            "Unix ts when the harvest pipeline last ran."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    ChildFetch,
    ChildParse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::ChildFetch => "child_fetch",
            Stage::ChildParse => "child_parse",
        })
    }
}

/// A non-fatal failure, kept for the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub source: String,
    pub stage: Stage,
    pub url: String,
    pub cause: String,
}

/// How far a sitemap index is followed.
#[derive(Debug, Clone, Copy)]
pub struct ChildSitemapPolicy {
    pub follow: bool,
    pub max_children: usize,
}

impl Default for ChildSitemapPolicy {
    fn default() -> Self {
        Self {
            follow: true,
            max_children: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Harvested {
        source: String,
        records: Vec<ArticleRecord>,
        drops: DropCounts,
        /// Child sitemap failures; the source still contributed.
        warnings: Vec<Diagnostic>,
    },
    Failed {
        source: String,
        diagnostic: Diagnostic,
    },
}

impl SourceOutcome {
    pub fn source(&self) -> &str {
        match self {
            SourceOutcome::Harvested { source, .. } | SourceOutcome::Failed { source, .. } => {
                source
            }
        }
    }

    pub fn records(&self) -> &[ArticleRecord] {
        match self {
            SourceOutcome::Harvested { records, .. } => records,
            SourceOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

fn diagnostic(source: &Source, stage: Stage, url: &str, cause: impl ToString) -> Diagnostic {
    let d = Diagnostic {
        source: source.name.clone(),
        stage,
        url: url.to_string(),
        cause: cause.to_string(),
    };
    warn!(
        source = %d.source,
        stage = %d.stage,
        url = %d.url,
        cause = %d.cause,
        "source stage failed"
    );
    counter!("harvest_source_errors_total", "stage" => stage.to_string()).increment(1);
    d
}

/// Fetch, parse and normalize one source. Never panics, never returns `Err`:
/// every failure ends up in the outcome.
pub async fn harvest_source(
    fetcher: &dyn FeedFetcher,
    source: &Source,
    children: ChildSitemapPolicy,
) -> SourceOutcome {
    ensure_metrics_described();

    let body = match fetcher.fetch(source).await {
        Ok(b) => b,
        Err(e) => {
            return SourceOutcome::Failed {
                source: source.name.clone(),
                diagnostic: diagnostic(source, Stage::Fetch, &source.feed_url, e),
            }
        }
    };

    let root = match parse_feed(&body, &source.name) {
        Ok(p) => p,
        Err(e) => {
            return SourceOutcome::Failed {
                source: source.name.clone(),
                diagnostic: diagnostic(source, Stage::Parse, &source.feed_url, e),
            }
        }
    };

    let mut entries: Vec<RawEntry> = root.entries;
    let mut warnings = Vec::new();

    if !root.child_sitemaps.is_empty() {
        if !children.follow {
            info!(
                source = %source.name,
                children = root.child_sitemaps.len(),
                "sitemap index not followed (disabled)"
            );
        } else {
            if root.child_sitemaps.len() > children.max_children {
                warn!(
                    source = %source.name,
                    listed = root.child_sitemaps.len(),
                    limit = children.max_children,
                    "sitemap index truncated"
                );
            }
            for url in root.child_sitemaps.iter().take(children.max_children) {
                let body = match fetcher.fetch_url(source, url).await {
                    Ok(b) => b,
                    Err(e) => {
                        warnings.push(diagnostic(source, Stage::ChildFetch, url, e));
                        continue;
                    }
                };
                match parse_feed(&body, &source.name) {
                    Ok(child) => {
                        if !child.child_sitemaps.is_empty() {
                            info!(
                                source = %source.name,
                                %url,
                                "nested sitemap index ignored (one level only)"
                            );
                        }
                        entries.extend(child.entries);
                    }
                    Err(e) => warnings.push(diagnostic(source, Stage::ChildParse, url, e)),
                }
            }
        }
    }

    let found = entries.len();
    let (records, drops) = normalize_batch(entries, &source.name);

    let dateless = drops.get(DropReason::MissingDate) + drops.get(DropReason::UnparseableDate);
    if found > 0 && records.is_empty() && dateless > 0 {
        warn!(source = %source.name, urls = found, "sitemap has no usable dates");
    }
    for (reason, n) in &drops.0 {
        counter!("harvest_dropped_total", "reason" => reason.as_str()).increment(*n as u64);
    }
    counter!("harvest_records_total", "source" => source.name.clone())
        .increment(records.len() as u64);

    info!(
        source = %source.name,
        found,
        kept = records.len(),
        dropped = drops.total(),
        "source harvested"
    );

    SourceOutcome::Harvested {
        source: source.name.clone(),
        records,
        drops,
        warnings,
    }
}
