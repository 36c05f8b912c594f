//! Blocking HTTP access for remote items
//!
//! Remote items need two operations: a lightweight HEAD probe that supports
//! conditional requests, and a full download into a local file. Transient
//! failures (connection errors, timeouts, 429 and 5xx) are retried with an
//! exponential backoff.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{
    CONTENT_LENGTH, CONTENT_TYPE, ETAG, EXPIRES, HeaderMap, HeaderName, IF_NONE_MATCH,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// How many times a transient failure is retried
    pub max_retries: u32,
    /// Value of the `User-Agent` header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            user_agent: concat!("resource-mirror/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Freshness information returned by a HEAD probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadInfo {
    pub etag: Option<String>,
    /// `Expires` as seconds since the Unix epoch
    pub expires: Option<f64>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

impl HeadInfo {
    fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            etag: text(ETAG),
            expires: text(EXPIRES).as_deref().and_then(parse_http_date),
            content_length: text(CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()),
            content_type: text(CONTENT_TYPE),
        }
    }
}

/// Result of a HEAD probe.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadOutcome {
    /// The server answered `304 Not Modified`
    NotModified,
    Found(HeadInfo),
}

/// Parse an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`) into epoch seconds.
///
/// Invalid dates such as `0` or `-1` yield `None`.
pub fn parse_http_date(value: &str) -> Option<f64> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp() as f64)
}

/// Copy a response body into `file`.
///
/// A body that breaks off before the advertised length is reported as
/// [`Error::SizeMismatch`] rather than as a transport error.
fn stream_body(
    url: &str,
    body: &mut impl Read,
    file: &mut File,
    dest: &Path,
    expected: Option<u64>,
) -> Result<u64> {
    let mut chunk = [0u8; 8192];
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut chunk) {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return match expected {
                    Some(expected) if written < expected => {
                        debug!(url, error = %e, "response body ended early");
                        Err(Error::SizeMismatch {
                            url: url.to_string(),
                            expected,
                            actual: written,
                        })
                    }
                    _ => Err(mirror_fs::Error::io(dest, e).into()),
                };
            }
        };
        file.write_all(&chunk[..n])
            .map_err(|e| mirror_fs::Error::io(dest, e))?;
        written += n as u64;
    }
}

/// Shared blocking HTTP client used by remote items.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: HttpConfig,
}

impl Fetcher {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(Error::Client)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Probe `url` with a HEAD request.
    ///
    /// When `etag` is given it is sent as `If-None-Match`, and a `304`
    /// answer becomes [`HeadOutcome::NotModified`].
    pub fn head(&self, url: &str, etag: Option<&str>) -> Result<HeadOutcome> {
        let response = self.send_with_retry("HEAD", url, || {
            let request = self.client.head(url);
            match etag {
                Some(etag) => request.header(IF_NONE_MATCH, etag),
                None => request,
            }
        })?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(url, "remote resource not modified");
            return Ok(HeadOutcome::NotModified);
        }
        Ok(HeadOutcome::Found(HeadInfo::from_headers(response.headers())))
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// If the server advertised a `Content-Length` and the body size differs,
    /// the partial file is removed and [`Error::SizeMismatch`] is returned.
    /// No partial file is left behind on any error.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.send_with_retry("GET", url, || self.client.get(url))?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                method: "GET",
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let expected = response.content_length();

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| mirror_fs::Error::io(parent, e))?;
        }
        let mut file = File::create(dest).map_err(|e| mirror_fs::Error::io(dest, e))?;
        let streamed = stream_body(url, &mut response, &mut file, dest, expected);
        drop(file);
        let written = match streamed {
            Ok(n) => n,
            Err(err) => {
                let _ = fs::remove_file(dest);
                return Err(err);
            }
        };

        if let Some(expected) = expected
            && expected != written
        {
            let _ = fs::remove_file(dest);
            return Err(Error::SizeMismatch {
                url: url.to_string(),
                expected,
                actual: written,
            });
        }
        debug!(url, bytes = written, "downloaded remote resource");
        Ok(written)
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        let max_elapsed = Duration::from_secs(self.config.timeout_secs.max(1) * 4);
        ExponentialBackoff {
            current_interval: Duration::from_millis(200),
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(max_elapsed),
            ..ExponentialBackoff::default()
        }
    }

    /// Send a request, retrying transient failures.
    ///
    /// Success and `304` responses are returned; any other status is an
    /// [`Error::HttpStatus`].
    fn send_with_retry(
        &self,
        method: &'static str,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut attempts = 0u32;
        let operation = || {
            attempts += 1;
            let outcome = build()
                .send()
                .map_err(|source| Error::Http {
                    url: url.to_string(),
                    source,
                })
                .and_then(|response| {
                    let status = response.status();
                    if status.is_success() || status == StatusCode::NOT_MODIFIED {
                        Ok(response)
                    } else {
                        Err(Error::HttpStatus {
                            method,
                            url: url.to_string(),
                            status: status.as_u16(),
                        })
                    }
                });

            outcome.map_err(|err| {
                if err.is_transient() && attempts <= self.config.max_retries {
                    warn!(url, attempt = attempts, error = %err, "retrying request");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        };

        backoff::retry(self.retry_policy(), operation).map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}
