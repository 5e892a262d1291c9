//! Filename derivation and sanitization for quarantined artifacts

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use url::Url;

/// Suffix appended to every saved artifact so it has no usable file association
pub const INERT_SUFFIX: &str = ".quarantine";

/// Suffix of a download still in progress
pub const PARTIAL_SUFFIX: &str = ".part";

pub const FALLBACK_NAME: &str = "file.bin";

const MAX_NAME_LEN: usize = 120;
const TRUNCATED_STEM_LEN: usize = 80;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());
static DISPOSITION_EXTENDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)filename\*=UTF-8''([^;\r\n]+)").unwrap());
static DISPOSITION_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename="?([^";]+)"?"#).unwrap());

/// Replaces runs of characters outside `[A-Za-z0-9._-]` with `_`
///
/// Names over 120 characters are cut to an 80-character stem, keeping the
/// extension when there is one.
///
/// # Arguments
///
/// * `name` - Raw name, possibly empty
/// * `fallback` - Used when `name` is blank
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let trimmed = name.trim();
    let raw = if trimmed.is_empty() { fallback } else { trimmed };
    let clean = DISALLOWED.replace_all(raw, "_").into_owned();

    if clean.chars().count() <= MAX_NAME_LEN {
        return clean;
    }

    match clean.rsplit_once('.') {
        Some((root, ext)) if !root.is_empty() => {
            let stem: String = root.chars().take(TRUNCATED_STEM_LEN).collect();
            format!("{}.{}", stem, ext)
        }
        _ => clean.chars().take(MAX_NAME_LEN).collect(),
    }
}

/// Extracts the server-suggested name from a `Content-Disposition` header
///
/// The RFC 5987 `filename*=UTF-8''...` form wins over plain `filename=`.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    if let Some(caps) = DISPOSITION_EXTENDED.captures(header) {
        let encoded = caps[1].trim();
        let decoded = urlencoding::decode(encoded)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| encoded.to_string());
        return Some(decoded).filter(|n| !n.trim().is_empty());
    }
    DISPOSITION_PLAIN
        .captures(header)
        .map(|caps| caps[1].trim().to_string())
        .filter(|n| !n.is_empty())
}

/// Last non-empty path segment of the URL, percent-decoded
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();
    let decoded = urlencoding::decode(&segment)
        .map(|c| c.into_owned())
        .unwrap_or(segment);
    Some(decoded)
}

/// First free `<name>.quarantine` path in `dir`
///
/// Collisions get `_1`, `_2`, ... inserted before the original extension.
pub fn unique_inert_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(format!("{}{}", name, INERT_SUFFIX));
    if !candidate.exists() {
        return candidate;
    }

    let (root, ext) = match name.rsplit_once('.') {
        Some((root, ext)) if !root.is_empty() => (root, Some(ext)),
        _ => (name, None),
    };
    let mut n = 1u32;
    loop {
        let numbered = match ext {
            Some(ext) => format!("{}_{}.{}{}", root, n, ext, INERT_SUFFIX),
            None => format!("{}_{}{}", root, n, INERT_SUFFIX),
        };
        let candidate = dir.join(numbered);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
