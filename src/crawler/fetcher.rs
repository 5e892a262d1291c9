//! Fetch engine contract and safety guards
//!
//! Both strategies implement [`Fetcher`]: given a URL, return decoded HTML or
//! fail with a typed [`FetchError`]. Neither ever returns attachment-shaped
//! content as HTML. The guards in this module are shared:
//! - the attachment-URL heuristic, checked before any request and on every
//!   redirect target
//! - response header checks (disposition, content type, declared length)
//! - the HTML size ceiling

use crate::config::FetchConfig;
use crate::crawler::browser::BrowserFetcher;
use crate::crawler::http::HttpFetcher;
use crate::url::is_attachment_url;
use crate::{DarkwatchError, FetchError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Content types accepted as HTML
pub const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Which fetch strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Direct HTTP(S) GET
    #[serde(alias = "requests")]
    Lightweight,

    /// Headless browser rendering for script-dependent sites
    #[serde(alias = "playwright")]
    Browser,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lightweight => "lightweight",
            Self::Browser => "browser",
        }
    }

    /// Picks the strategy for one forum
    ///
    /// An explicit choice wins, then the forum's hint, then the default.
    pub fn resolve(
        explicit: Option<FetchStrategy>,
        hint: Option<FetchStrategy>,
        default: FetchStrategy,
    ) -> FetchStrategy {
        explicit.or(hint).unwrap_or(default)
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully fetched HTML document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub html: String,
}

/// One safe retrieval of an HTML page
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn strategy(&self) -> FetchStrategy;

    /// Fetches a page, enforcing every safety guard
    async fn fetch_html(&self, url: &Url) -> Result<FetchedPage, FetchError>;

    /// Releases sessions held by the fetcher
    async fn shutdown(&self) {}
}

/// Builds a fetcher for the given strategy
///
/// The browser strategy launches Chromium lazily on its first fetch, so this
/// never starts a browser process by itself.
pub fn build_fetcher(
    strategy: FetchStrategy,
    config: &FetchConfig,
) -> Result<Box<dyn Fetcher>, DarkwatchError> {
    Ok(match strategy {
        FetchStrategy::Lightweight => Box::new(HttpFetcher::new(config)?),
        FetchStrategy::Browser => Box::new(BrowserFetcher::new(config)),
    })
}

/// Rejects URLs that must never be fetched as pages
///
/// # Returns
///
/// * `Ok(())` - The URL may be requested
/// * `Err(FetchError::BlockedUrl)` - Non-web scheme or attachment-shaped URL
pub fn guard_url(url: &Url) -> Result<(), FetchError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FetchError::BlockedUrl {
            url: url.to_string(),
            reason: format!("scheme '{}' is not fetchable", url.scheme()),
        });
    }

    if is_attachment_url(url.as_str()) {
        return Err(FetchError::BlockedUrl {
            url: url.to_string(),
            reason: "matches attachment heuristic".to_string(),
        });
    }

    Ok(())
}

/// Checks response headers before any body byte is read
///
/// Rejects `Content-Disposition: attachment`, a content type outside
/// [`HTML_CONTENT_TYPES`] (a missing header counts as outside), and a
/// declared `Content-Length` above `max_bytes`.
pub fn guard_headers(url: &Url, headers: &HeaderMap, max_bytes: u64) -> Result<(), FetchError> {
    let unsafe_response = |reason: String| FetchError::UnsafeResponse {
        url: url.to_string(),
        reason,
    };

    if let Some(disposition) = headers.get(CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()) {
        if disposition.to_ascii_lowercase().contains("attachment") {
            return Err(unsafe_response(format!(
                "content-disposition '{}'",
                disposition
            )));
        }
    }

    let content_type = media_type(headers);
    if !HTML_CONTENT_TYPES.contains(&content_type.as_str()) {
        return Err(unsafe_response(format!(
            "content-type '{}' is not HTML",
            content_type
        )));
    }

    if let Some(length) = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        if length > max_bytes {
            return Err(unsafe_response(format!(
                "content-length {} exceeds {} bytes",
                length, max_bytes
            )));
        }
    }

    Ok(())
}

/// Lowercased media type of a response, without parameters
pub fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Enforces the HTML size ceiling on a fully materialized document
pub fn guard_size(url: &Url, len: usize, max_bytes: u64) -> Result<(), FetchError> {
    if len as u64 > max_bytes {
        return Err(FetchError::UnsafeResponse {
            url: url.to_string(),
            reason: format!("document of {} bytes exceeds {} bytes", len, max_bytes),
        });
    }
    Ok(())
}
