use crate::crawler::FetchStrategy;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Darkwatch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub quarantine: QuarantineConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Forum profiles keyed by forum key
    #[serde(default)]
    pub forums: BTreeMap<String, ForumProfile>,
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum list pages followed per seed URL
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Lower bound of the politeness delay (milliseconds)
    #[serde(rename = "delay-min-ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the politeness delay (milliseconds)
    #[serde(rename = "delay-max-ms")]
    pub delay_max_ms: u64,

    /// Strategy used when neither the CLI nor the forum profile picks one
    pub engine: FetchStrategy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 2,
            delay_min_ms: 1000,
            delay_max_ms: 2000,
            engine: FetchStrategy::Lightweight,
        }
    }
}

/// Fetch engine settings shared by both strategies
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Ceiling on HTML body size, applied to streamed and rendered documents
    #[serde(rename = "max-html-bytes")]
    pub max_html_bytes: u64,

    #[serde(rename = "max-redirects")]
    pub max_redirects: u32,

    /// Total attempts for retryable failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "backoff-base-ms")]
    pub backoff_base_ms: u64,

    /// Route traffic through the SOCKS proxy
    #[serde(rename = "use-proxy")]
    pub use_proxy: bool,

    /// SOCKS endpoint for the lightweight strategy (host:port)
    #[serde(rename = "lightweight-proxy")]
    pub lightweight_proxy: String,

    /// SOCKS endpoint for the browser strategy (host:port)
    #[serde(rename = "browser-proxy")]
    pub browser_proxy: String,

    /// Wait after DOM-ready before reading the rendered document
    #[serde(rename = "browser-settle-ms")]
    pub browser_settle_ms: u64,

    /// Hard deadline for a whole fetch, including retries or rendering
    #[serde(rename = "render-deadline-secs")]
    pub render_deadline_secs: u64,

    #[serde(rename = "chrome-path")]
    pub chrome_path: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; DarkWatch/1.0)".to_string(),
            timeout_secs: 30,
            max_html_bytes: 3_000_000,
            max_redirects: 5,
            max_retries: 3,
            backoff_base_ms: 1200,
            use_proxy: false,
            lightweight_proxy: "127.0.0.1:9150".to_string(),
            browser_proxy: "127.0.0.1:9050".to_string(),
            browser_settle_ms: 2000,
            render_deadline_secs: 60,
            chrome_path: None,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base path of the JSONL log; a run timestamp is appended to the stem
    #[serde(rename = "log-path")]
    pub log_path: PathBuf,

    /// Optional SQLite mirror
    #[serde(rename = "sqlite-path")]
    pub sqlite_path: Option<PathBuf>,

    /// Processed-identifier file used by alerting
    #[serde(rename = "seen-ids-path")]
    pub seen_ids_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("out/crawl.jsonl"),
            sqlite_path: None,
            seen_ids_path: PathBuf::from("out/processed_ids.log"),
        }
    }
}

/// Opt-in attachment downloader
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuarantineConfig {
    pub enabled: bool,

    #[serde(rename = "out-dir")]
    pub out_dir: PathBuf,

    #[serde(rename = "max-file-bytes")]
    pub max_file_bytes: u64,

    #[serde(rename = "max-per-thread")]
    pub max_per_thread: usize,

    /// Only fetch attachments hosted on the thread's own host
    #[serde(rename = "same-host")]
    pub same_host: bool,

    /// Archive each thread folder after downloading
    pub archive: bool,

    #[serde(rename = "archive-password")]
    pub archive_password: Option<String>,

    /// External tool used for password-protected archives
    pub archiver: String,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            out_dir: PathBuf::from("quarantine"),
            max_file_bytes: 20_000_000,
            max_per_thread: 5,
            same_host: false,
            archive: false,
            archive_password: None,
            archiver: "7z".to_string(),
        }
    }
}

/// Triage thresholds, keyword tables and per-pass filters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    #[serde(rename = "keep-threshold")]
    pub keep_threshold: i32,

    #[serde(rename = "drop-threshold")]
    pub drop_threshold: i32,

    /// Tags that earn the high-value score bonus
    #[serde(rename = "high-value-tags")]
    pub high_value_tags: Vec<String>,

    /// Page titles that indicate a bot-challenge interstitial
    #[serde(rename = "challenge-titles")]
    pub challenge_titles: Vec<String>,

    /// Tag category to regex list
    pub keywords: BTreeMap<String, Vec<String>>,

    /// Keys left out of `[triage.strict]` keep the strict defaults
    #[serde(deserialize_with = "strict_pass")]
    pub strict: PassSettings,

    /// Keys left out of `[triage.relaxed]` keep the relaxed defaults
    #[serde(deserialize_with = "relaxed_pass")]
    pub relaxed: PassSettings,
}

impl Default for TriageConfig {
    fn default() -> Self {
        let keywords = [
            ("db_leak", r"\b(leak|database|dump|combo|breach|exfil)\b"),
            ("gov_id", r"\b(ssn|sin|aadhaar|passport|cnic|national ?id)\b"),
            ("gaming", r"\b(steam|pubg|gta|freefire|ubisoft|game)\b"),
            ("source", r"\b(source code|sdk|repo|src)\b"),
            (
                "account",
                r"\b(account|credentials|login|user:pass|mail access)\b",
            ),
        ]
        .into_iter()
        .map(|(tag, pattern)| (tag.to_string(), vec![pattern.to_string()]))
        .collect();

        Self {
            keep_threshold: 2,
            drop_threshold: 0,
            high_value_tags: vec![
                "db_leak".to_string(),
                "source".to_string(),
                "account".to_string(),
            ],
            challenge_titles: vec![
                "Checking your browser before accessing darkforums.st".to_string(),
                "Just a moment...".to_string(),
            ],
            keywords,
            strict: PassSettings::strict(),
            relaxed: PassSettings::relaxed(),
        }
    }
}

/// Filter settings for one triage pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSettings {
    /// URL patterns excluded outright
    pub exclude_url_patterns: Vec<String>,

    /// Retain challenge/interstitial pages instead of dropping them
    pub keep_challenge: bool,

    /// Minimum characters of content for a post to survive
    pub min_chars: usize,

    /// Let threads with zero surviving posts through
    pub allow_empty: bool,
}

/// A pass table as written; absent keys fall back to the pass defaults
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PassTable {
    #[serde(rename = "exclude-url-patterns")]
    exclude_url_patterns: Option<Vec<String>>,

    #[serde(rename = "keep-challenge")]
    keep_challenge: Option<bool>,

    #[serde(rename = "min-chars")]
    min_chars: Option<usize>,

    #[serde(rename = "allow-empty")]
    allow_empty: Option<bool>,
}

impl PassTable {
    fn over(self, base: PassSettings) -> PassSettings {
        PassSettings {
            exclude_url_patterns: self.exclude_url_patterns.unwrap_or(base.exclude_url_patterns),
            keep_challenge: self.keep_challenge.unwrap_or(base.keep_challenge),
            min_chars: self.min_chars.unwrap_or(base.min_chars),
            allow_empty: self.allow_empty.unwrap_or(base.allow_empty),
        }
    }
}

fn strict_pass<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PassSettings, D::Error> {
    Ok(PassTable::deserialize(deserializer)?.over(PassSettings::strict()))
}

fn relaxed_pass<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PassSettings, D::Error> {
    Ok(PassTable::deserialize(deserializer)?.over(PassSettings::relaxed()))
}

const ANNOUNCEMENT_PATTERN: &str = r"/Announcement-";
const FORUM_ROOT_PATTERN: &str = r"/Forum-[A-Za-z0-9\-]+$";
const ACTION_ONLY_PATTERN: &str = r"[?&](action)=(newpost|lastpost)$";
const PAGINATION_ONLY_PATTERN: &str = r"[?&](page)=\d+$";

impl PassSettings {
    pub fn strict() -> Self {
        Self {
            exclude_url_patterns: vec![
                ANNOUNCEMENT_PATTERN.to_string(),
                FORUM_ROOT_PATTERN.to_string(),
                ACTION_ONLY_PATTERN.to_string(),
                PAGINATION_ONLY_PATTERN.to_string(),
            ],
            keep_challenge: false,
            min_chars: 20,
            allow_empty: false,
        }
    }

    pub fn relaxed() -> Self {
        Self {
            exclude_url_patterns: vec![
                ANNOUNCEMENT_PATTERN.to_string(),
                FORUM_ROOT_PATTERN.to_string(),
                ACTION_ONLY_PATTERN.to_string(),
            ],
            keep_challenge: true,
            min_chars: 5,
            allow_empty: true,
        }
    }
}

/// Batch escalation runner settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    #[serde(rename = "max-page")]
    pub max_page: u32,

    #[serde(rename = "chunk-size")]
    pub chunk_size: u32,

    #[serde(rename = "lightweight-attempts")]
    pub lightweight_attempts: u32,

    #[serde(rename = "retry-backoff-min-ms")]
    pub retry_backoff_min_ms: u64,

    #[serde(rename = "retry-backoff-max-ms")]
    pub retry_backoff_max_ms: u64,

    #[serde(rename = "chunk-pause-min-ms")]
    pub chunk_pause_min_ms: u64,

    #[serde(rename = "chunk-pause-max-ms")]
    pub chunk_pause_max_ms: u64,

    /// Per-page allowance used to bound one chunk attempt
    #[serde(rename = "chunk-timeout-per-page-secs")]
    pub chunk_timeout_per_page_secs: u64,

    /// Command (argv) run between lightweight attempts to refresh the circuit
    #[serde(rename = "circuit-refresh")]
    pub circuit_refresh: Option<Vec<String>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_page: 800,
            chunk_size: 200,
            lightweight_attempts: 3,
            retry_backoff_min_ms: 5000,
            retry_backoff_max_ms: 10_000,
            chunk_pause_min_ms: 1500,
            chunk_pause_max_ms: 3000,
            chunk_timeout_per_page_secs: 60,
            circuit_refresh: None,
        }
    }
}

/// A list of candidate CSS selectors, tried in order
///
/// Accepts either a single string or an array in TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct SelectorList(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for SelectorList {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => SelectorList(vec![s]),
            OneOrMany::Many(v) => SelectorList(v),
        }
    }
}

impl SelectorList {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.trim().is_empty())
    }
}

impl<const N: usize> From<[&str; N]> for SelectorList {
    fn from(value: [&str; N]) -> Self {
        SelectorList(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Declarative per-forum mapping from logical field to candidate selectors
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForumProfile {
    /// Seed list-page URLs
    #[serde(rename = "list-urls")]
    pub list_urls: Vec<String>,

    /// Preferred fetch strategy
    #[serde(default)]
    pub engine: Option<FetchStrategy>,

    #[serde(rename = "thread-link")]
    pub thread_link: SelectorList,

    #[serde(rename = "thread-title", default)]
    pub thread_title: SelectorList,

    #[serde(rename = "post-container")]
    pub post_container: SelectorList,

    pub content: SelectorList,

    #[serde(default)]
    pub author: SelectorList,

    #[serde(rename = "posted-time", default)]
    pub posted_time: SelectorList,

    #[serde(rename = "post-permalink", default)]
    pub post_permalink: SelectorList,

    #[serde(rename = "attachment-block", default)]
    pub attachment_block: SelectorList,

    #[serde(rename = "attachment-name", default)]
    pub attachment_name: SelectorList,

    #[serde(rename = "attachment-size", default)]
    pub attachment_size: SelectorList,

    #[serde(rename = "next-page", default)]
    pub next_page: SelectorList,
}
