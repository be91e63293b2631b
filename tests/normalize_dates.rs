// tests/normalize_dates.rs
//
// Parsed fixture → normalized records, with drop accounting.

use chrono::{TimeZone, Utc};
use news_sitemap_harvester::ingest::normalize::{normalize_batch, parse_timestamp};
use news_sitemap_harvester::ingest::parse::parse_feed;
use news_sitemap_harvester::{ArticleRecord, DropReason, RawEntry};

fn fixture(name: &str) -> Vec<u8> {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("read {path}: {e}"))
}

#[test]
fn fixture_feed_normalizes_to_utc_and_counts_drops() {
    let feed = parse_feed(&fixture("news_sitemap.xml"), "example").unwrap();
    let (records, drops) = normalize_batch(feed.entries, "example");

    assert_eq!(
        records,
        vec![
            ArticleRecord {
                url: "https://news.example.com/2025/01/02/markets-rally.html".into(),
                publication_date: Utc.with_ymd_and_hms(2025, 1, 2, 14, 30, 0).unwrap(),
                publication: "example".into(),
            },
            ArticleRecord {
                url: "https://news.example.com/2025/01/01/quiet-day.html".into(),
                publication_date: Utc.with_ymd_and_hms(2025, 1, 1, 18, 0, 0).unwrap(),
                publication: "example".into(),
            },
        ]
    );
    assert_eq!(drops.get(DropReason::MissingDate), 1);
    assert_eq!(drops.get(DropReason::UnparseableDate), 1);
    assert_eq!(drops.get(DropReason::MissingUrl), 0);
    assert_eq!(drops.total(), 2);
}

#[test]
fn offset_crossing_midnight_lands_on_the_utc_day() {
    let ts = parse_timestamp("2025-01-01T22:30:00-05:00").unwrap();
    assert_eq!(ts, Utc.with_ymd_and_hms(2025, 1, 2, 3, 30, 0).unwrap());

    let rec = news_sitemap_harvester::ingest::normalize::normalize(
        RawEntry {
            url: Some("https://a.test/late".into()),
            raw_date: Some("2025-01-01T22:30:00-05:00".into()),
        },
        "a",
    )
    .unwrap();
    assert_eq!(rec.day().to_string(), "2025-01-02");
}

#[test]
fn date_only_values_mean_midnight_utc() {
    let feed = parse_feed(&fixture("prefixed_loc.xml"), "wire").unwrap();
    let (records, drops) = normalize_batch(feed.entries, "wire");
    assert_eq!(drops.total(), 0);
    assert_eq!(
        records[0].publication_date,
        Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap()
    );
    assert_eq!(
        records[1].publication_date,
        Utc.with_ymd_and_hms(2025, 1, 3, 7, 15, 0).unwrap()
    );
}

#[test]
fn blank_url_is_dropped_before_the_date_is_looked_at() {
    let (records, drops) = normalize_batch(
        vec![RawEntry {
            url: Some("   ".into()),
            raw_date: Some("not a date".into()),
        }],
        "x",
    );
    assert!(records.is_empty());
    assert_eq!(drops.get(DropReason::MissingUrl), 1);
    assert_eq!(drops.get(DropReason::UnparseableDate), 0);
}
