// src/lib.rs
// Public library surface for the `harvest` binary and integration tests.

pub mod config;
pub mod errors;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod rolling;

// ---- Re-exports for stable public API ----
pub use crate::config::HarvestConfig;
pub use crate::errors::{DropReason, FetchError, ParseError, StoreError};
pub use crate::history::{merge, HistoryStore, RecordSet};
pub use crate::ingest::types::{ArticleRecord, RawEntry, Source};
pub use crate::pipeline::{Pipeline, RunSummary};
