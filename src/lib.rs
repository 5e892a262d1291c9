//! Darkwatch: a forum-harvesting crawler for clear-web and onion sites
//!
//! This crate walks forum listing pages, extracts threads and posts with
//! per-forum CSS selector profiles, persists them as an append-only JSON Lines
//! log (optionally mirrored into SQLite), and post-processes the log into
//! triaged, scored outputs. Attachments are never downloaded unless the opt-in
//! quarantine downloader is enabled.

pub mod alert;
pub mod batch;
pub mod config;
pub mod crawler;
pub mod output;
pub mod quarantine;
pub mod records;
pub mod state;
pub mod storage;
pub mod triage;
pub mod url;

use thiserror::Error;

/// Main error type for Darkwatch operations
#[derive(Debug, Error)]
pub enum DarkwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No forum profile configured for '{0}'")]
    ConfigMissing(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Selector miss for field '{field}' on {url}")]
    ParseMiss { field: String, url: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid crawl phase transition: {from} -> {to}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetch engine failures
///
/// `Transport` and `HttpStatus` (429 and 5xx) are the only retryable kinds;
/// safety rejections are final.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Blocked before request {url}: {reason}")]
    BlockedUrl { url: String, reason: String },

    #[error("Unsafe response from {url}: {reason}")]
    UnsafeResponse { url: String, reason: String },

    #[error("Too many redirects from {url}")]
    TooManyRedirects { url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Deadline exceeded for {url}")]
    DeadlineExceeded { url: String },
}

impl FetchError {
    /// Returns true if the failure is transient and worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Returns true if the URL or response was refused by a safety guard
    pub fn is_safety_rejection(&self) -> bool {
        matches!(self, Self::BlockedUrl { .. } | Self::UnsafeResponse { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in forum '{forum}' field '{field}': {selector}")]
    InvalidSelector {
        forum: String,
        field: String,
        selector: String,
    },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Darkwatch operations
pub type Result<T> = std::result::Result<T, DarkwatchError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, ForumProfile};
pub use crawler::{FetchStrategy, Fetcher};
pub use records::{AttachmentRef, PostRecord, ThreadRecord};
pub use state::CrawlPhase;
pub use url::{canonical_thread_url, is_attachment_url};
