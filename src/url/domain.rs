use url::Url;

/// Extracts the host from a URL string, lowercased
///
/// # Arguments
///
/// * `url` - The URL to extract the host from
///
/// # Returns
///
/// * `Some(String)` - The lowercase host
/// * `None` - If the URL does not parse or has no host
///
/// # Examples
///
/// ```
/// use darkwatch::url::extract_host;
///
/// assert_eq!(extract_host("http://ABC.onion/x"), Some("abc.onion".to_string()));
/// assert_eq!(extract_host("not a url"), None);
/// ```
pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Returns true if both URLs parse and share the same host and port
pub fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.host_str().map(|h| h.to_lowercase()) == b.host_str().map(|h| h.to_lowercase())
                && a.port_or_known_default() == b.port_or_known_default()
                && a.host_str().is_some()
        }
        _ => false,
    }
}
