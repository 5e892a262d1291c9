//! Normalization, challenge detection and per-pass filtering

use crate::records::{sha256_hex, PostRecord, ThreadRecord};
use crate::triage::extract::{extract_prices, tag_keywords, telegram_handles};
use crate::triage::rules::{PassRules, TriageRules, FONT_BBCODE, WHITESPACE};
use crate::triage::{Contacts, TriageRecord};
use crate::url::{canonical_thread_url, url_slug_title};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashSet;

/// Posts (after the first) that feed the tag and contact sample
const SAMPLE_EXTRA_POSTS: usize = 2;

/// Cleans one post: strips font BBCode, collapses whitespace, and replaces an
/// unparseable timestamp with the thread's fetch time
pub fn clean_post(post: &PostRecord, fetched_at: DateTime<Utc>) -> PostRecord {
    let stripped = FONT_BBCODE.replace_all(post.content.trim(), "");
    let content = WHITESPACE.replace_all(&stripped, " ").trim().to_string();

    let posted_at = if post.posted_at.is_empty() || is_iso_timestamp(&post.posted_at) {
        post.posted_at.clone()
    } else {
        fetched_at.to_rfc3339()
    };

    PostRecord {
        post_url: post.post_url.clone(),
        author: post.author.clone().filter(|a| !a.trim().is_empty()),
        posted_at,
        content,
        attachments: post.attachments.clone(),
    }
}

/// True for RFC 3339 and the common ISO-8601 date/time shapes
pub fn is_iso_timestamp(value: &str) -> bool {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Real title, or one derived from the URL slug when the title is missing or
/// a challenge page title
pub fn normalize_title(title: Option<&str>, raw_url: &str, rules: &TriageRules) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() && !rules.is_challenge_title(title) => t.to_string(),
        _ => url_slug_title(raw_url)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| raw_url.to_string()),
    }
}

/// A blocked or interstitial page: a challenge title or no posts at all
pub fn is_challenge_page(record: &ThreadRecord, rules: &TriageRules, keep_challenge: bool) -> bool {
    if keep_challenge {
        return false;
    }
    rules.is_challenge_title(record.title.as_deref()) || record.posts.is_empty()
}

/// First post plus up to two more, space-joined
pub fn content_sample(posts: &[PostRecord]) -> String {
    posts
        .iter()
        .take(1 + SAMPLE_EXTRA_POSTS)
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One filtering pass over a record stream
///
/// Holds the pass's dedup state, so a fresh `FilterPass` is needed per pass.
pub struct FilterPass<'a> {
    pass: &'a PassRules,
    rules: &'a TriageRules,
    seen_threads: HashSet<String>,
    seen_posts: HashSet<String>,
    pub total: usize,
    pub kept: usize,
}

impl<'a> FilterPass<'a> {
    pub fn new(pass: &'a PassRules, rules: &'a TriageRules) -> Self {
        Self {
            pass,
            rules,
            seen_threads: HashSet::new(),
            seen_posts: HashSet::new(),
            total: 0,
            kept: 0,
        }
    }

    /// Runs one record through the pass
    ///
    /// # Returns
    ///
    /// * `Some(TriageRecord)` - The record survived; a new derivative record
    /// * `None` - Excluded, blocked, empty, or a duplicate
    pub fn apply(&mut self, record: &ThreadRecord) -> Option<TriageRecord> {
        self.total += 1;
        let raw_url = record.thread_url.as_str();

        if self.pass.excludes_url(raw_url) {
            tracing::trace!(pass = self.pass.name, "Excluded URL {}", raw_url);
            return None;
        }
        if is_challenge_page(record, self.rules, self.pass.keep_challenge) {
            tracing::trace!(pass = self.pass.name, "Challenge page {}", raw_url);
            return None;
        }

        let mut posts = Vec::with_capacity(record.posts.len());
        for post in &record.posts {
            let post = clean_post(post, record.fetched_at);
            if self.pass.min_chars > 0 && post.content.chars().count() < self.pass.min_chars {
                continue;
            }
            let fingerprint = sha256_hex(&format!("{}|{}", post.post_url, post.content));
            if !self.seen_posts.insert(fingerprint) {
                continue;
            }
            posts.push(post);
        }

        if posts.is_empty() && !self.pass.allow_empty {
            return None;
        }

        let canon_url = canonical_thread_url(raw_url);
        let thread_key = if record.thread_hash.is_empty() {
            sha256_hex(&canon_url)
        } else {
            record.thread_hash.clone()
        };
        if !self.seen_threads.insert(thread_key.clone()) {
            return None;
        }

        let title = normalize_title(record.title.as_deref(), raw_url, self.rules);
        let sample = if posts.is_empty() {
            title.clone()
        } else {
            content_sample(&posts)
        };
        let text = format!("{} {}", title, sample);

        self.kept += 1;
        Some(TriageRecord {
            source: record.source.clone(),
            thread_url: record.thread_url.clone(),
            canon_url,
            title,
            raw_title: record.title.clone(),
            thread_hash: thread_key,
            fetched_at: record.fetched_at,
            post_count: posts.len(),
            tags: tag_keywords(&text, self.rules),
            contacts: Contacts {
                telegram: telegram_handles(&text),
            },
            prices: extract_prices(&text),
            posts,
            score: None,
            classification: None,
        })
    }
}
