// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::ingest::profiles::IdentityProfile;

/// A configured publisher feed. Built once from config, never mutated.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String, // e.g., "nytimes", "wsj"
    pub feed_url: String,
    pub profile: IdentityProfile,
}

impl Source {
    pub fn new(name: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed_url: feed_url.into(),
            profile: IdentityProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: IdentityProfile) -> Self {
        self.profile = profile;
        self
    }
}

/// One `<url>`-like item as found in a feed, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub url: Option<String>,
    pub raw_date: Option<String>,
}

/// Canonical unit of the history: one article sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub url: String, // unique key within a record set
    pub publication_date: DateTime<Utc>,
    pub publication: String,
}

impl ArticleRecord {
    /// UTC calendar day used for daily partitions.
    pub fn day(&self) -> chrono::NaiveDate {
        self.publication_date.date_naive()
    }
}
