//! Thread, post and attachment records produced by the structural parser
//!
//! Records are created once by the parser and never mutated afterwards;
//! triage builds its own derivative records from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of characters of concatenated post content that feed the thread hash
pub const FINGERPRINT_CONTENT_CHARS: usize = 5000;

/// One thread as extracted from a forum thread page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Forum key from the configuration
    pub source: String,

    /// URL the thread was fetched from
    pub thread_url: String,

    /// Thread title, if any selector matched
    pub title: Option<String>,

    /// Posts in page order
    #[serde(default)]
    pub posts: Vec<PostRecord>,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Content fingerprint, see [`thread_fingerprint`]
    #[serde(default)]
    pub thread_hash: String,
}

/// A single message within a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_url: String,
    pub author: Option<String>,
    /// Best-effort timestamp string as shown by the page, or the fetch time
    pub posted_at: String,
    /// Whitespace-normalized plain text
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

/// Attachment display metadata. Never implies that the file was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub display_filename: Option<String>,
    pub display_size: Option<String>,
    pub attachment_url: Option<String>,
}

impl ThreadRecord {
    /// Host of the thread URL, lowercased
    pub fn host(&self) -> Option<String> {
        ::url::Url::parse(&self.thread_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }

    /// Iterates every attachment URL across all posts
    pub fn attachment_urls(&self) -> impl Iterator<Item = &str> {
        self.posts
            .iter()
            .flat_map(|p| p.attachments.iter())
            .filter_map(|a| a.attachment_url.as_deref())
    }
}

/// Hex-encoded SHA-256 of a string
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the content fingerprint of a thread
///
/// The fingerprint is the SHA-256 of the title followed by the first
/// [`FINGERPRINT_CONTENT_CHARS`] characters of all post bodies concatenated.
/// It does not depend on the URL, so the same thread reached through
/// different pagination parameters hashes identically.
///
/// # Arguments
///
/// * `title` - The thread title, if any
/// * `posts` - Posts in page order
///
/// # Returns
///
/// A 64-character lowercase hex digest
pub fn thread_fingerprint(title: Option<&str>, posts: &[PostRecord]) -> String {
    let joined: String = posts.iter().map(|p| p.content.as_str()).collect();
    let leading: String = joined.chars().take(FINGERPRINT_CONTENT_CHARS).collect();
    sha256_hex(&format!("{}{}", title.unwrap_or(""), leading))
}

/// Computes the per-post fingerprint (`sha256(post_url|content)`)
///
/// Used both for per-post dedup in triage and as the finding identifier
/// for alerting.
pub fn post_fingerprint(post_url: &str, content: &str) -> String {
    sha256_hex(&format!("{}|{}", post_url, content))
}
