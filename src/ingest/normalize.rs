// src/ingest/normalize.rs
//! Raw entry → `ArticleRecord`: URL re-validation, mixed-format date parsing
//! to UTC, publication stamping. Entries that cannot be resolved are dropped
//! and counted, never coerced.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;

use crate::errors::DropReason;
use crate::ingest::types::{ArticleRecord, RawEntry};

/// Offset-carrying layouts, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Timezone-naive layouts; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn utc_suffix_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*(?:z|utc|gmt)$").expect("utc suffix regex"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// Parse a feed or history timestamp into a UTC instant.
///
/// Accepts RFC 3339 (with or without offset, `T` or space separated,
/// fractional seconds), `+HHMM` offsets, minute precision, bare dates
/// (midnight UTC), trailing `UTC`/`GMT`, and RFC 2822. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = ws_re().replace_all(raw.trim(), " ");
    let s = s.as_ref();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // "…Z", "… UTC", "… GMT" all mean the naive part is already UTC.
    let naive = utc_suffix_re().replace(s, "");
    let naive = naive.as_ref();
    for fmt in NAIVE_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(ndt.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }

    parse_rfc2822(s)
}

fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Turn one raw entry into a record stamped with `source_name`.
pub fn normalize(entry: RawEntry, source_name: &str) -> Result<ArticleRecord, DropReason> {
    let url = entry
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(DropReason::MissingUrl)?;

    let raw_date = entry
        .raw_date
        .filter(|d| !d.trim().is_empty())
        .ok_or(DropReason::MissingDate)?;

    let publication_date = parse_timestamp(&raw_date).ok_or(DropReason::UnparseableDate)?;

    Ok(ArticleRecord {
        url,
        publication_date,
        publication: source_name.to_string(),
    })
}

/// Per-reason drop counts of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropCounts(pub BTreeMap<DropReason, usize>);

impl DropCounts {
    pub fn add(&mut self, reason: DropReason) {
        *self.0.entry(reason).or_default() += 1;
    }

    pub fn get(&self, reason: DropReason) -> usize {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn merge(&mut self, other: &DropCounts) {
        for (reason, n) in &other.0 {
            *self.0.entry(*reason).or_default() += n;
        }
    }
}

/// Normalize a batch, keeping feed order. Returns survivors and drop counts.
pub fn normalize_batch(
    entries: Vec<RawEntry>,
    source_name: &str,
) -> (Vec<ArticleRecord>, DropCounts) {
    let mut kept = Vec::with_capacity(entries.len());
    let mut drops = DropCounts::default();
    for entry in entries {
        match normalize(entry, source_name) {
            Ok(rec) => kept.push(rec),
            Err(reason) => drops.add(reason),
        }
    }
    (kept, drops)
}
