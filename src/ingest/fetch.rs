// src/ingest/fetch.rs
//! Feed retrieval: HTTP GET with an identity profile, bounded retries with
//! exponential backoff, and gzip sniffing on the payload.

use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use metrics::histogram;
use reqwest::{Client, StatusCode};
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::FetchError;
use crate::ingest::types::Source;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Retrieve one document for `source`. `url` is the source's feed URL or
    /// a child sitemap listed by it.
    async fn fetch_url(&self, source: &Source, url: &str) -> Result<Vec<u8>, FetchError>;

    async fn fetch(&self, source: &Source) -> Result<Vec<u8>, FetchError> {
        self.fetch_url(source, &source.feed_url).await
    }
}

// ---------------------------------------------------------------------------
// Retry state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// What to do after `attempt` (1-based) failed with the given disposition.
    pub fn next_step(&self, attempt: u32, disposition: Disposition) -> RetryStep {
        if disposition == Disposition::Terminal || attempt >= self.max_attempts {
            RetryStep::GiveUp
        } else {
            RetryStep::RetryAfter(self.backoff(attempt))
        }
    }
}

/// 5xx is worth another try; everything else non-2xx is final.
pub fn classify_status(status: StatusCode) -> Disposition {
    if status.is_server_error() {
        Disposition::Retryable
    } else {
        Disposition::Terminal
    }
}

fn classify_transport(err: &reqwest::Error) -> Disposition {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        Disposition::Retryable
    } else {
        Disposition::Terminal
    }
}

// ---------------------------------------------------------------------------
// Payload decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Plain,
    Gzip,
    /// Looked like gzip but did not inflate; passed through untouched.
    CorruptGzip,
}

/// Inflate the payload when it starts with the gzip magic number, whatever
/// the URL suffix or `Content-Encoding` claimed.
pub fn decode_payload(payload: Vec<u8>) -> (Vec<u8>, PayloadKind) {
    if !payload.starts_with(&GZIP_MAGIC) {
        return (payload, PayloadKind::Plain);
    }
    let mut out = Vec::with_capacity(payload.len() * 4);
    match MultiGzDecoder::new(&payload[..]).read_to_end(&mut out) {
        Ok(_) => (out, PayloadKind::Gzip),
        Err(e) => {
            debug!(error = %e, "gzip magic present but inflate failed; using raw bytes");
            (payload, PayloadKind::CorruptGzip)
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

struct AttemptFailure {
    status: Option<u16>,
    cause: String,
    disposition: Disposition,
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, policy })
    }

    async fn attempt(&self, source: &Source, url: &str) -> Result<Vec<u8>, AttemptFailure> {
        let resp = self
            .client
            .get(url)
            .headers(source.profile.headers.clone())
            .send()
            .await
            .map_err(|e| AttemptFailure {
                status: e.status().map(|s| s.as_u16()),
                disposition: classify_transport(&e),
                cause: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AttemptFailure {
                status: Some(status.as_u16()),
                cause: format!("HTTP {status}"),
                disposition: classify_status(status),
            });
        }

        let body = resp.bytes().await.map_err(|e| AttemptFailure {
            status: Some(status.as_u16()),
            disposition: classify_transport(&e),
            cause: format!("reading body: {e}"),
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch_url(&self, source: &Source, url: &str) -> Result<Vec<u8>, FetchError> {
        let t0 = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(source, url).await {
                Ok(raw) => {
                    let (bytes, kind) = decode_payload(raw);
                    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
                    histogram!("harvest_fetch_ms").record(ms);
                    debug!(
                        source = %source.name,
                        %url,
                        attempt,
                        bytes = bytes.len(),
                        payload = ?kind,
                        "feed fetched"
                    );
                    return Ok(bytes);
                }
                Err(fail) => match self.policy.next_step(attempt, fail.disposition) {
                    RetryStep::RetryAfter(delay) => {
                        warn!(
                            source = %source.name,
                            %url,
                            attempt,
                            status = ?fail.status,
                            delay_ms = delay.as_millis() as u64,
                            cause = %fail.cause,
                            "fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryStep::GiveUp => {
                        return Err(FetchError {
                            source_name: source.name.clone(),
                            url: url.to_string(),
                            http_status: fail.status,
                            cause: fail.cause,
                            attempts: attempt,
                            retryable: fail.disposition == Disposition::Retryable,
                        });
                    }
                },
            }
        }
    }
}
