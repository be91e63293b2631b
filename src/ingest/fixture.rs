// src/ingest/fixture.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::FetchError;
use crate::ingest::fetch::FeedFetcher;
use crate::ingest::types::Source;

/// Serves canned payloads keyed by URL. Unknown URLs answer 404.
/// Used by tests and for replaying saved feeds without network access.
pub struct StaticFetcher {
    payloads: HashMap<String, Result<Vec<u8>, u16>>,
    pub calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self {
            payloads: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.payloads.insert(url.to_string(), Ok(body.into()));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.payloads.insert(url.to_string(), Err(status));
        self
    }
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch_url(&self, source: &Source, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        let status = match self.payloads.get(url) {
            Some(Ok(body)) => return Ok(crate::ingest::fetch::decode_payload(body.clone()).0),
            Some(Err(status)) => *status,
            None => 404,
        };
        Err(FetchError {
            source_name: source.name.clone(),
            url: url.to_string(),
            http_status: Some(status),
            cause: format!("HTTP {status}"),
            attempts: 1,
            retryable: status >= 500,
        })
    }
}
