//! Alerting collaborator support
//!
//! Turns thread records into per-post findings with a risk level, and tells
//! registered hooks about each finding exactly once across runs. Delivery
//! (issue trackers, dashboards) lives behind [`FindingHook`].

mod feed;
mod seen;
mod timestamp;

pub use feed::{AlertFeed, FeedSource};
pub use seen::SeenStore;
pub use timestamp::resolve_posted_at;

use crate::records::{post_fingerprint, ThreadRecord};
use crate::storage::{read_records, RecordSink};
use crate::DarkwatchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Keyword family a finding falls into; the first matching family wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    DataLeak,
    ConfidentialDocuments,
    Exploit,
    Malware,
    Fraud,
    SpamMarketing,
    General,
}

impl RiskCategory {
    const ORDERED: [RiskCategory; 6] = [
        Self::DataLeak,
        Self::ConfidentialDocuments,
        Self::Exploit,
        Self::Malware,
        Self::Fraud,
        Self::SpamMarketing,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::DataLeak => &[
                "database", "db", "leak", "email list", "phone list", "ssn", "combo list",
                "dehashed", "user:pass", "데이터베이스",
            ],
            Self::ConfidentialDocuments => &[
                "document", "confidential", "internal", "company", "military", "기업정보",
                "내부문서", "기밀문서",
            ],
            Self::Exploit => &[
                "exploit", "vulnerability", "zeroday", "0day", "poc", "source code", "unpacked",
                "ddos", "해킹", "취약점",
            ],
            Self::Malware => &[
                "rat", "trojan", "stealer", "ransomware", "builder", "cracked", "crypter",
                "botnet", "악성코드",
            ],
            Self::Fraud => &["corruption", "fraud", "embezzlement", "insider", "부정", "비리"],
            Self::SpamMarketing => &[
                "marketing", "telegram channel", "telegram", "contact", "스팸", "마케팅",
            ],
            Self::General => &[],
        }
    }

    pub fn risk(&self) -> RiskLevel {
        match self {
            Self::DataLeak | Self::ConfidentialDocuments | Self::Exploit | Self::Malware => {
                RiskLevel::Critical
            }
            Self::Fraud | Self::SpamMarketing => RiskLevel::Warning,
            Self::General => RiskLevel::Informational,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    Warning,
    Informational,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "Critical",
            Self::Warning => "Warning",
            Self::Informational => "Informational",
        };
        f.write_str(s)
    }
}

/// Categorizes text by case-insensitive substring match
pub fn classify(text: &str) -> RiskCategory {
    let lower = text.to_lowercase();
    RiskCategory::ORDERED
        .into_iter()
        .find(|category| category.keywords().iter().any(|k| lower.contains(k)))
        .unwrap_or(RiskCategory::General)
}

/// One post worth an analyst's attention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Post fingerprint: sha256 of `post_url|content`
    pub id: String,
    pub source: String,
    pub thread_url: String,
    pub thread_title: Option<String>,
    pub thread_hash: String,
    pub post_url: String,
    pub author: Option<String>,
    pub category: RiskCategory,
    pub risk: RiskLevel,
    pub posted_at: DateTime<Utc>,
    pub content: String,
}

/// One finding per post of a record
pub fn findings_from_record(record: &ThreadRecord) -> Vec<Finding> {
    let title_lower = record.title.as_deref().unwrap_or_default().to_lowercase();

    record
        .posts
        .iter()
        .map(|post| {
            let category = classify(&format!("{} {}", title_lower, post.content));
            Finding {
                id: post_fingerprint(&post.post_url, &post.content),
                source: record.source.clone(),
                thread_url: record.thread_url.clone(),
                thread_title: record.title.clone(),
                thread_hash: record.thread_hash.clone(),
                post_url: post.post_url.clone(),
                author: post.author.clone(),
                category,
                risk: category.risk(),
                posted_at: resolve_posted_at(&post.posted_at, record.fetched_at),
                content: post.content.clone(),
            }
        })
        .collect()
}

/// Every finding in the given logs, newest first
///
/// Missing logs are skipped.
pub fn known_findings(logs: &[PathBuf]) -> Result<Vec<Finding>, DarkwatchError> {
    let mut findings = Vec::new();
    for path in logs {
        if !path.is_file() {
            tracing::debug!("Skipping missing log {}", path.display());
            continue;
        }
        for record in read_records(path)? {
            findings.extend(findings_from_record(&record));
        }
    }
    findings.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
    Ok(findings)
}

/// Receives each finding the first time it is observed
#[async_trait]
pub trait FindingHook: Send + Sync {
    async fn on_new_finding(&self, finding: &Finding) -> Result<(), DarkwatchError>;
}

/// Logs each new finding
pub struct LogHook;

#[async_trait]
impl FindingHook for LogHook {
    async fn on_new_finding(&self, finding: &Finding) -> Result<(), DarkwatchError> {
        tracing::info!(
            risk = %finding.risk,
            source = %finding.source,
            "New finding {} in {}",
            &finding.id[..12.min(finding.id.len())],
            finding.thread_url
        );
        Ok(())
    }
}

/// Dispatches new findings to hooks at crawl time
pub struct AlertSink {
    seen: SeenStore,
    hooks: Vec<Box<dyn FindingHook>>,
    dispatched: usize,
}

impl AlertSink {
    pub fn new(seen: SeenStore) -> Self {
        Self {
            seen,
            hooks: Vec::new(),
            dispatched: 0,
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn FindingHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Calls every hook for each unseen finding, then marks it seen
    ///
    /// Hook errors are logged and do not stop the remaining hooks.
    pub async fn dispatch(&mut self, findings: Vec<Finding>) -> Result<usize, DarkwatchError> {
        let mut new = 0;
        for finding in findings {
            if self.seen.contains(&finding.id) {
                continue;
            }
            for hook in &self.hooks {
                if let Err(e) = hook.on_new_finding(&finding).await {
                    tracing::warn!("Finding hook failed for {}: {}", finding.post_url, e);
                }
            }
            self.seen.mark(&finding.id)?;
            new += 1;
        }
        self.dispatched += new;
        Ok(new)
    }
}

#[async_trait]
impl RecordSink for AlertSink {
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        if let Err(e) = self.dispatch(findings_from_record(record)).await {
            tracing::warn!("Alert dispatch failed for {}: {}", record.thread_url, e);
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), DarkwatchError> {
        tracing::info!("Dispatched {} new finding(s)", self.dispatched);
        Ok(())
    }
}
