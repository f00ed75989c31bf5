use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, USER_AGENT};
use tracing::{info, warn};

use crate::error::IngestError;

pub trait Downloader {
    /// Fetches `url` into `destination`, calling `on_progress(downloaded, total)`
    /// as bytes arrive.
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<PathBuf, IngestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let multiplier = self.factor.saturating_pow(exponent);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

enum AttemptError {
    Transient(String),
    Fatal(IngestError),
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
    policy: RetryPolicy,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, IngestError> {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("camtrap-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::DownloadHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| IngestError::DownloadHttp(err.to_string()))?;
        Ok(Self { client, policy })
    }

    fn attempt(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<(), AttemptError> {
        let existing = fs::metadata(destination).map(|meta| meta.len()).unwrap_or(0);
        let mut request = self.client.get(url);
        if existing > 0 {
            request = request.header(RANGE, format!("bytes={existing}-"));
        }

        let mut response = request.send().map_err(|err| {
            if is_retryable_error(&err) {
                AttemptError::Transient(err.to_string())
            } else {
                AttemptError::Fatal(IngestError::DownloadHttp(err.to_string()))
            }
        })?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            // A previous attempt already has the whole body.
            on_progress(existing, Some(existing));
            return Ok(());
        }
        if is_retryable_status(status.as_u16()) {
            return Err(AttemptError::Transient(format!("status {status}")));
        }
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(AttemptError::Fatal(IngestError::DownloadStatus {
                status: status.as_u16(),
                message,
            }));
        }

        let resumed = status == StatusCode::PARTIAL_CONTENT;
        let start = if resumed { existing } else { 0 };
        let total = response.content_length().map(|len| len + start);
        let mut file = open_destination(destination, resumed).map_err(AttemptError::Fatal)?;

        let mut downloaded = start;
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| AttemptError::Transient(err.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .map_err(|err| AttemptError::Fatal(IngestError::Filesystem(err.to_string())))?;
            downloaded += read as u64;
            on_progress(downloaded, total);
        }
        file.flush()
            .map_err(|err| AttemptError::Fatal(IngestError::Filesystem(err.to_string())))?;
        Ok(())
    }
}

impl Downloader for HttpDownloader {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<PathBuf, IngestError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| IngestError::Filesystem(err.to_string()))?;
        }
        let mut attempt = 1u32;
        loop {
            match self.attempt(url, destination, on_progress) {
                Ok(()) => {
                    info!(url, path = %destination.display(), "download complete");
                    return Ok(destination.to_path_buf());
                }
                Err(AttemptError::Transient(message)) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    warn!(url, attempt, ?delay, %message, "download retry");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(AttemptError::Transient(message)) => {
                    return Err(IngestError::DownloadHttp(format!(
                        "{message} (gave up after {attempt} attempts)"
                    )));
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }
}

fn open_destination(path: &Path, append: bool) -> Result<File, IngestError> {
    let result = if append {
        OpenOptions::new().append(true).open(path)
    } else {
        File::create(path)
    };
    result.map_err(|err| IngestError::Filesystem(format!("{}: {err}", path.display())))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let delays = (1..=7).map(|n| policy.delay(n).as_secs()).collect::<Vec<_>>();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
    }
}
