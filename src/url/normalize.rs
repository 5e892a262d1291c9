use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static TRAILING_PAGE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([?&]page=\d+)$").expect("page param pattern is valid"));

/// Resolves an extracted href against the page it was found on
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only anchors
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
///
/// # Arguments
///
/// * `href` - The raw attribute value
/// * `base_url` - URL of the page containing the link
///
/// # Returns
///
/// The absolute URL, or None when the link is not navigable
pub fn resolve_href(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    // Same-page anchors
    if href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Strips a trailing pagination parameter from a thread URL
///
/// `.../Thread-X?page=3` and `.../Thread-X` canonicalize to the same string,
/// so one thread reached through different pages dedups to one record.
/// Only a trailing `page=N` is removed; mid-query parameters are kept.
///
/// # Examples
///
/// ```
/// use darkwatch::url::canonical_thread_url;
///
/// assert_eq!(
///     canonical_thread_url("http://f.onion/Thread-X?page=3"),
///     "http://f.onion/Thread-X"
/// );
/// assert_eq!(
///     canonical_thread_url("http://f.onion/t.php?tid=9&page=2"),
///     "http://f.onion/t.php?tid=9"
/// );
/// ```
pub fn canonical_thread_url(url: &str) -> String {
    TRAILING_PAGE_PARAM.replace(url, "").into_owned()
}

/// Returns a copy of the URL with its `page` query parameter set
///
/// An existing `page` parameter is replaced in place; otherwise `page` is
/// appended after the existing query pairs.
pub fn with_page_param(url: &Url, page: u32) -> Url {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut replaced = false;
    for (key, value) in pairs.iter_mut() {
        if key == "page" {
            *value = page.to_string();
            replaced = true;
        }
    }
    if !replaced {
        pairs.push(("page".to_string(), page.to_string()));
    }

    let mut scoped = url.clone();
    scoped.query_pairs_mut().clear().extend_pairs(pairs);
    scoped
}

/// Derives a human-readable title from the last path segment of a URL
///
/// `http://f.onion/Thread-Fresh-Combo-List` becomes `Thread Fresh Combo List`.
pub fn url_slug_title(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let slug = without_query.trim_end_matches('/').rsplit('/').next()?;
    if slug.is_empty() || slug.contains(':') {
        return None;
    }
    Some(slug.replace('-', " "))
}
