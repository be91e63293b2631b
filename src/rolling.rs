//! # Rolling retention
//! Trailing-window pruning of the persisted history.
//!
//! `Archival` keeps everything; `Rolling` keeps only records newer than
//! `now - window`. Pruning is a pure filter, the caller persists the result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::history::RecordSet;

/// Default trailing window for rolling mode (30 days).
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionMode {
    Archival,
    Rolling,
}

impl Default for RetentionMode {
    fn default() -> Self {
        RetentionMode::Archival
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub mode: RetentionMode,
    pub window_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            mode: RetentionMode::Archival,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn rolling(window_days: u32) -> Self {
        Self {
            mode: RetentionMode::Rolling,
            window_days,
        }
    }

    /// `None` for archival mode.
    pub fn max_age(&self) -> Option<Duration> {
        match self.mode {
            RetentionMode::Archival => None,
            RetentionMode::Rolling => Some(Duration::days(i64::from(self.window_days))),
        }
    }
}

/// Records at or before this instant are pruned. `None` when the window
/// reaches past the earliest representable instant.
pub fn cutoff(now: DateTime<Utc>, max_age: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(max_age)
}

/// Keep records with `publication_date > now - max_age`.
pub fn prune(mut history: RecordSet, now: DateTime<Utc>, max_age: Duration) -> RecordSet {
    if let Some(limit) = cutoff(now, max_age) {
        history.retain(|r| r.publication_date > limit);
    }
    history
}
