//! Compiled triage rules
//!
//! Patterns from `[triage]` are compiled once per pipeline run. Exclusion
//! patterns and keyword patterns match case-insensitively.

use crate::config::{PassSettings, TriageConfig};
use crate::ConfigError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

/// Contact handle: `@name` not preceded by a word character
pub static TELEGRAM_HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\w])@([A-Za-z0-9_]{4,})").unwrap());

/// Amount with an optional leading or trailing currency marker
pub static PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(USD|\$|IDR)\s*)?(\d{1,3}(?:[.,]\d{3})*|\d+)\s*(?:USD|\$|IDR)?").unwrap()
});

/// Raw thread URL that only points at a "new post"/"last post" action
pub static ACTION_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[?&](action)=(newpost|lastpost)").unwrap());

pub(crate) static FONT_BBCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[/?font[^\]]*\]").unwrap());

pub(crate) static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn compile_ci(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

/// Shared rules for both passes and the scorer
#[derive(Debug, Clone)]
pub struct TriageRules {
    pub keywords: Vec<(String, Vec<Regex>)>,
    pub challenge_titles: HashSet<String>,
    pub high_value_tags: HashSet<String>,
    pub keep_threshold: i32,
    pub drop_threshold: i32,
}

impl TriageRules {
    pub fn compile(config: &TriageConfig) -> Result<Self, ConfigError> {
        let keywords = config
            .keywords
            .iter()
            .map(|(tag, patterns)| {
                let compiled = patterns
                    .iter()
                    .map(|p| compile_ci(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((tag.clone(), compiled))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            keywords,
            challenge_titles: config.challenge_titles.iter().cloned().collect(),
            high_value_tags: config.high_value_tags.iter().cloned().collect(),
            keep_threshold: config.keep_threshold,
            drop_threshold: config.drop_threshold,
        })
    }

    pub fn is_challenge_title(&self, title: Option<&str>) -> bool {
        title.map_or(false, |t| self.challenge_titles.contains(t))
    }
}

/// Filter settings of one pass, compiled
#[derive(Debug, Clone)]
pub struct PassRules {
    pub name: &'static str,
    /// All exclusion patterns joined into one alternation
    pub exclude: Option<Regex>,
    pub keep_challenge: bool,
    pub min_chars: usize,
    pub allow_empty: bool,
}

impl PassRules {
    pub fn compile(name: &'static str, settings: &PassSettings) -> Result<Self, ConfigError> {
        let exclude = if settings.exclude_url_patterns.is_empty() {
            None
        } else {
            Some(compile_ci(&settings.exclude_url_patterns.join("|"))?)
        };
        Ok(Self {
            name,
            exclude,
            keep_challenge: settings.keep_challenge,
            min_chars: settings.min_chars,
            allow_empty: settings.allow_empty,
        })
    }

    pub fn excludes_url(&self, raw_url: &str) -> bool {
        self.exclude.as_ref().map_or(false, |re| re.is_match(raw_url))
    }
}
