//! URL handling module for Darkwatch
//!
//! This module provides the attachment-URL heuristic that guards every fetch,
//! href resolution for extracted links, pagination canonicalization, and
//! host extraction.

mod domain;
mod normalize;

use crate::{UrlError, UrlResult};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

// Re-export main functions
pub use domain::{extract_host, same_host};
pub use normalize::{canonical_thread_url, resolve_href, url_slug_title, with_page_param};

/// Path segments and file extensions that mark a URL as a downloadable file
static ATTACHMENT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(/attachment|/attachments|/upload|/uploads|/files|/download)|(\.(zip|7z|rar|exe|iso|apk|jar|bat|ps1|dll|scr|docm|xlsm|pdf|gz|bz2|xz)(?:$|\?))",
    )
    .expect("attachment heuristic pattern is valid")
});

/// Returns true if the URL looks like a file download rather than a page
///
/// Matches download-ish path segments (`/attachment`, `/upload`, `/files`,
/// `/download`, ...) and extensions typical of archives, executables and
/// macro-capable documents. Checked before any network call and on every
/// redirect target.
///
/// # Examples
///
/// ```
/// use darkwatch::url::is_attachment_url;
///
/// assert!(is_attachment_url("http://forum.onion/files/dump.zip"));
/// assert!(is_attachment_url("http://forum.onion/download/123"));
/// assert!(is_attachment_url("http://forum.onion/x/setup.EXE?dl=1"));
/// assert!(!is_attachment_url("http://forum.onion/Thread-Selling-DB"));
/// ```
pub fn is_attachment_url(url: &str) -> bool {
    ATTACHMENT_URL.is_match(url)
}

/// Parses a string as an absolute HTTP(S) URL
///
/// # Returns
///
/// * `Ok(Url)` - A parsed URL with an http or https scheme and a host
/// * `Err(UrlError)` - The string is not a usable absolute web URL
pub fn parse_http_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_extensions() {
        for url in [
            "http://f.onion/a/tool.exe",
            "http://f.onion/a/dump.zip",
            "http://f.onion/a/archive.rar",
            "http://f.onion/a/archive.7z?x=1",
            "http://f.onion/a/report.PDF",
            "http://f.onion/a/invoice.docm",
            "http://f.onion/a/data.tar.gz",
        ] {
            assert!(is_attachment_url(url), "{} should be blocked", url);
        }
    }

    #[test]
    fn test_attachment_path_segments() {
        for url in [
            "http://f.onion/download/991",
            "http://f.onion/attachment.php?aid=4",
            "http://f.onion/uploads/2024/a",
            "http://f.onion/files/x",
        ] {
            assert!(is_attachment_url(url), "{} should be blocked", url);
        }
    }

    #[test]
    fn test_ordinary_pages_pass() {
        for url in [
            "http://f.onion/Thread-Selling-Fresh-Combo",
            "http://f.onion/showthread.php?tid=12&page=2",
            "http://f.onion/Forum-Databases",
            "http://f.onion/zipper-club",
        ] {
            assert!(!is_attachment_url(url), "{} should pass", url);
        }
    }

    #[test]
    fn test_extension_must_end_path() {
        assert!(!is_attachment_url("http://f.onion/how.zip.works/thread"));
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("http://abc.onion/").is_ok());
        assert!(parse_http_url("  https://example.com/x ").is_ok());
        assert!(matches!(
            parse_http_url("ftp://example.com/"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(parse_http_url("not a url"), Err(UrlError::Parse(_))));
    }
}
