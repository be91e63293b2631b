// src/partition.rs
//! Daily snapshots: one `YYYY-MM-DD.csv` per UTC day touched by the run,
//! each holding the full history slice for that day (rewritten, not appended).

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::StoreError;
use crate::history::{write_table, RecordSet};
use crate::ingest::types::ArticleRecord;

/// Distinct UTC days among this run's new records.
pub fn dates_of_interest<'a, I>(new_records: I) -> BTreeSet<NaiveDate>
where
    I: IntoIterator<Item = &'a ArticleRecord>,
{
    new_records.into_iter().map(ArticleRecord::day).collect()
}

/// Slice `history` by day for each date of interest. Every requested date
/// gets an entry, possibly empty; records keep the canonical order.
pub fn partition(
    history: &RecordSet,
    dates: &BTreeSet<NaiveDate>,
) -> BTreeMap<NaiveDate, Vec<ArticleRecord>> {
    let mut out: BTreeMap<NaiveDate, Vec<ArticleRecord>> =
        dates.iter().map(|d| (*d, Vec::new())).collect();
    for rec in history {
        if let Some(slot) = out.get_mut(&rec.day()) {
            slot.push(rec.clone());
        }
    }
    out
}

pub fn partition_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
}

/// Persist each day as its own table. Returns the number of files written.
pub fn write_partitions(
    dir: &Path,
    parts: &BTreeMap<NaiveDate, Vec<ArticleRecord>>,
) -> Result<usize, StoreError> {
    for (date, records) in parts {
        let path = partition_path(dir, *date);
        write_table(&path, records)?;
        debug!(path = %path.display(), records = records.len(), "daily partition written");
    }
    Ok(parts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec(url: &str, day: u32, hour: u32) -> ArticleRecord {
        ArticleRecord {
            url: url.into(),
            publication_date: Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap(),
            publication: "p".into(),
        }
    }

    #[test]
    fn only_touched_days_are_sliced_in_full() {
        let history = RecordSet::from_records(vec![
            rec("old-same-day", 2, 1),
            rec("other-day", 3, 5),
            rec("new", 2, 23),
        ]);
        let new = [rec("new", 2, 23)];
        let dates = dates_of_interest(new.iter());
        let parts = partition(&history, &dates);

        assert_eq!(parts.len(), 1);
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let urls: Vec<_> = parts[&day].iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["new", "old-same-day"]);
    }

    #[test]
    fn files_are_named_by_day_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let history = RecordSet::from_records(vec![rec("a", 2, 1)]);
        let dates: BTreeSet<_> = [NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()].into();

        let n = write_partitions(dir.path(), &partition(&history, &dates)).unwrap();
        assert_eq!(n, 1);
        let path = dir.path().join("2025-01-02.csv");
        let first = std::fs::read_to_string(&path).unwrap();

        write_partitions(dir.path(), &partition(&history, &dates)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert_eq!(first.lines().count(), 2);
    }
}
