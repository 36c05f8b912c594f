//! Files served over HTTP
//!
//! The mark of a remote item captures the response headers of the last
//! probe. A still-valid `Expires` skips the network entirely; otherwise a
//! conditional HEAD with the recorded `ETag` decides.

use std::fmt;
use std::sync::Arc;

use mirror_fs::{ScopedFile, validate_segment};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Freshness, ItemBehavior, Mark};
use crate::Result;
use crate::http::{Fetcher, HeadOutcome};

const FALLBACK_NAME: &str = "unnamed_file";

#[derive(Debug, Default, Deserialize)]
struct RemoteMark {
    url: String,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    expires: Option<f64>,
}

fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Clone)]
pub struct RemoteItem {
    url: String,
    fetcher: Arc<Fetcher>,
}

impl RemoteItem {
    pub fn new(url: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            url: url.into(),
            fetcher,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Local file name for a download: the last URL path segment when it
    /// is a valid file name.
    pub fn file_name(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .map(str::to_string)
            })
            .filter(|name| {
                !name.is_empty() && name != "." && name != ".." && validate_segment(0, name).is_ok()
            })
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }

    fn previous_for_url(&self, previous: Option<&Mark>) -> Option<RemoteMark> {
        previous
            .and_then(|mark| RemoteMark::deserialize(mark).ok())
            .filter(|mark| mark.url == self.url)
    }
}

impl fmt::Debug for RemoteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteItem").field("url", &self.url).finish()
    }
}

impl ItemBehavior for RemoteItem {
    fn load_file(&self) -> Result<ScopedFile> {
        let (dir, path) = ScopedFile::reserve(&self.file_name())?;
        self.fetcher.download(&self.url, &path)?;
        Ok(ScopedFile::in_temp_dir(dir, path))
    }

    fn refresh_mark(&self, previous: Option<&Mark>) -> Result<Freshness> {
        let previous = self.previous_for_url(previous);

        if let Some(expires) = previous.as_ref().and_then(|m| m.expires)
            && now_epoch() < expires
        {
            debug!(url = %self.url, "cached representation has not expired");
            return Ok(Freshness::Unchanged);
        }

        let etag = previous.and_then(|m| m.etag);
        match self.fetcher.head(&self.url, etag.as_deref())? {
            HeadOutcome::NotModified => Ok(Freshness::Unchanged),
            HeadOutcome::Found(info) => Ok(Freshness::Changed(json!({
                "url": self.url,
                "etag": info.etag,
                "expires": info.expires,
                "content_length": info.content_length,
                "content_type": info.content_type,
            }))),
        }
    }
}
