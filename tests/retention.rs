// tests/retention.rs
//
// Rolling retention window against the persisted history.

use chrono::{Duration, TimeZone, Utc};
use news_sitemap_harvester::rolling::{cutoff, prune, RetentionMode, RetentionPolicy};
use news_sitemap_harvester::{ArticleRecord, HistoryStore, RecordSet};
use tempfile::tempdir;

fn rec(url: &str, y: i32, m: u32, d: u32) -> ArticleRecord {
    ArticleRecord {
        url: url.to_string(),
        publication_date: Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
        publication: "p".to_string(),
    }
}

#[test]
fn thirty_day_window_keeps_only_recent_records() {
    let now = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    let history = RecordSet::from_records(vec![
        rec("https://old", 2024, 12, 15),
        rec("https://edge", 2025, 1, 2),
        rec("https://fresh", 2025, 1, 20),
    ]);
    let policy = RetentionPolicy::rolling(30);
    let kept = prune(history, now, policy.max_age().unwrap());
    let urls: Vec<&str> = kept.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, ["https://fresh"]);
    assert_eq!(
        cutoff(now, Duration::days(30)),
        Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
    );
}

#[test]
fn archival_mode_never_prunes() {
    let policy = RetentionPolicy::default();
    assert_eq!(policy.mode, RetentionMode::Archival);
    assert!(policy.max_age().is_none());
}

#[test]
fn pruned_history_persists() {
    let dir = tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("h.csv"));
    let now = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    let history = RecordSet::from_records(vec![
        rec("https://old", 2024, 12, 1),
        rec("https://new", 2025, 1, 31),
    ]);
    let kept = prune(history, now, Duration::days(7));
    store.save(&kept).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded.get("https://new").is_some());
}
