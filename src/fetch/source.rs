// src/fetch/source.rs

use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::{thread::sleep, time::Duration};
use tracing::{debug, error, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Upper bound on the wait between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Anything that can hand back the full body behind a URL.
pub trait RemoteSource {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP(S) source with optional retry and exponential backoff.
pub struct HttpSource {
    client: Client,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl HttpSource {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(secs) = cfg.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        } else {
            // blocking client otherwise gives up after 30s
            builder = builder.timeout(None);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self {
            client,
            max_retries: cfg.max_retries,
            initial_backoff_ms: cfg.retry_backoff_ms,
        })
    }

    fn get_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .send()
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Transport failures, 5xx and 429 are worth another attempt; anything else
/// (404 for a month that is not published yet) will not improve.
fn is_transient(err: &FetchError) -> bool {
    match err {
        FetchError::Http { .. } => true,
        FetchError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        _ => false,
    }
}

/// `initial * 2^(attempt-1)`, saturating and capped at [`MAX_BACKOFF_MS`].
fn backoff_ms(initial_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    initial_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

impl RemoteSource for HttpSource {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempts = 0;
        loop {
            match self.get_once(url) {
                Ok(body) => return Ok(body),
                Err(e) if attempts < self.max_retries && is_transient(&e) => {
                    attempts += 1;
                    let backoff = backoff_ms(self.initial_backoff_ms, attempts);
                    warn!(%url, attempt = attempts, delay_ms = backoff, error = %e, "Retrying");
                    sleep(Duration::from_millis(backoff));
                }
                Err(e) => {
                    if attempts > 0 {
                        error!(%url, error = %e, "Exhausted retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}
