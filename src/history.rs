//! history.rs: the persisted, deduplicated article history.
//!
//! The history is a flat CSV table (`url,date,publication`) read and written
//! wholesale each run. Merging is last-write-wins by position: the later
//! sighting of a URL replaces the earlier one regardless of its date.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::ingest::normalize::parse_timestamp;
use crate::ingest::types::ArticleRecord;

const COLUMNS: [&str; 3] = ["url", "date", "publication"];

/// Deduplicated records in canonical order: date desc, publication asc, url asc.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<ArticleRecord>,
}

impl RecordSet {
    /// Dedup by URL keeping the last occurrence, then sort canonically.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ArticleRecord>,
    {
        let mut slot_of: HashMap<String, usize> = HashMap::new();
        let mut slots: Vec<ArticleRecord> = Vec::new();
        for rec in records {
            match slot_of.get(&rec.url) {
                Some(&i) => slots[i] = rec,
                None => {
                    slot_of.insert(rec.url.clone(), slots.len());
                    slots.push(rec);
                }
            }
        }
        slots.sort_by(canonical_order);
        Self { records: slots }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArticleRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<ArticleRecord> {
        self.records
    }

    pub fn get(&self, url: &str) -> Option<&ArticleRecord> {
        self.records.iter().find(|r| r.url == url)
    }

    /// Keep records matching `keep`; order is preserved.
    pub fn retain<F: FnMut(&ArticleRecord) -> bool>(&mut self, keep: F) {
        self.records.retain(keep);
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a ArticleRecord;
    type IntoIter = std::slice::Iter<'a, ArticleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

pub fn canonical_order(a: &ArticleRecord, b: &ArticleRecord) -> Ordering {
    b.publication_date
        .cmp(&a.publication_date)
        .then_with(|| a.publication.cmp(&b.publication))
        .then_with(|| a.url.cmp(&b.url))
}

/// Concatenate `existing` then `incoming`; incoming wins on URL conflicts.
pub fn merge(existing: RecordSet, incoming: Vec<ArticleRecord>) -> RecordSet {
    RecordSet::from_records(existing.into_vec().into_iter().chain(incoming))
}

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    url: String,
    date: String,
    publication: String,
}

impl From<&ArticleRecord> for Row {
    fn from(r: &ArticleRecord) -> Self {
        Self {
            url: r.url.clone(),
            date: r.publication_date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            publication: r.publication.clone(),
        }
    }
}

/// Rows that could not be turned back into records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted history. A missing file is an empty history.
    pub fn load(&self) -> Result<RecordSet, StoreError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no history yet, starting empty");
            return Ok(RecordSet::default());
        }
        let (records, stats) = read_table(&self.path)?;
        if stats.skipped > 0 {
            warn!(
                path = %self.path.display(),
                skipped = stats.skipped,
                rows = stats.rows,
                "history rows skipped (bad date or shape)"
            );
        }
        let set = RecordSet::from_records(records);
        debug!(path = %self.path.display(), records = set.len(), "history loaded");
        Ok(set)
    }

    pub fn save(&self, set: &RecordSet) -> Result<(), StoreError> {
        write_table(&self.path, set.as_slice())?;
        info!(path = %self.path.display(), records = set.len(), "history saved");
        Ok(())
    }
}

pub(crate) fn read_table(path: &Path) -> Result<(Vec<ArticleRecord>, LoadStats), StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    for column in COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(StoreError::Schema {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    let mut out = Vec::new();
    let mut stats = LoadStats::default();
    for row in reader.deserialize::<Row>() {
        stats.rows += 1;
        let row = match row {
            Ok(r) => r,
            Err(e) if e.is_io_error() => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
            Err(_) => {
                stats.skipped += 1;
                continue;
            }
        };
        let url = row.url.trim();
        match parse_timestamp(&row.date) {
            Some(publication_date) if !url.is_empty() => out.push(ArticleRecord {
                url: url.to_string(),
                publication_date,
                publication: row.publication,
            }),
            _ => stats.skipped += 1,
        }
    }
    Ok((out, stats))
}

/// Write the whole table to `<path>.tmp`, then rename into place.
pub(crate) fn write_table(path: &Path, records: &[ArticleRecord]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write_err = |source: csv::Error| StoreError::Write {
        path: tmp.clone(),
        source,
    };
    // Header is written by hand so an empty slice still gets one.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp)
        .map_err(write_err)?;
    writer.write_record(COLUMNS).map_err(write_err)?;
    for rec in records {
        writer.serialize(Row::from(rec)).map_err(write_err)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
