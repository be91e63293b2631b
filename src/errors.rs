// src/errors.rs
//! Error taxonomy of a harvest run.
//!
//! `FetchError` and `ParseError` stay inside the source boundary, `StoreError`
//! is the only one allowed to abort a run. Dropped records are not errors at
//! all, see [`DropReason`].

use std::path::PathBuf;
use thiserror::Error;

/// Retrieval failure for one feed document, after retries were spent.
#[derive(Debug, Clone, Error)]
#[error("fetch {url} for {source_name} failed after {attempts} attempt(s): {cause}")]
pub struct FetchError {
    pub source_name: String,
    pub url: String,
    pub http_status: Option<u16>,
    pub cause: String,
    pub attempts: u32,
    /// Whether the last failure was of a retryable kind (5xx, transport).
    pub retryable: bool,
}

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("malformed xml at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("document has no root element")]
    NoRoot,

    /// Typically an anti-bot challenge served instead of the sitemap.
    #[error("document root is <{root}>, not a sitemap")]
    NotAFeed { root: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("filesystem error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is missing column `{column}`", .path.display())]
    Schema { path: PathBuf, column: &'static str },
}

/// Why a raw entry did not become an `ArticleRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    MissingUrl,
    MissingDate,
    UnparseableDate,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingUrl => "missing_url",
            DropReason::MissingDate => "missing_date",
            DropReason::UnparseableDate => "unparseable_date",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_message_names_source_and_status_cause() {
        let e = FetchError {
            source_name: "wsj".into(),
            url: "https://example.test/news.xml".into(),
            http_status: Some(503),
            cause: "HTTP 503 Service Unavailable".into(),
            attempts: 3,
            retryable: true,
        };
        let msg = e.to_string();
        assert!(msg.contains("wsj"));
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn store_error_displays_path() {
        let e = StoreError::Schema {
            path: PathBuf::from("data/master_data.csv"),
            column: "publication",
        };
        assert_eq!(
            e.to_string(),
            "data/master_data.csv is missing column `publication`"
        );
    }
}
