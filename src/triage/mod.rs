//! Offline triage pipeline over a persisted crawl log
//!
//! Two independently configured passes read the same log:
//! - strict: conservative filtering for a core dataset
//! - relaxed: permissive filtering followed by keep/review/drop scoring
//!
//! Each pass writes a filtered JSONL file and a flat CSV summary next to the
//! input, named after the input stem.

mod extract;
mod filter;
mod rules;
mod score;

pub use extract::{extract_prices, tag_keywords, telegram_handles, Price};
pub use filter::{
    clean_post, content_sample, is_challenge_page, is_iso_timestamp, normalize_title, FilterPass,
};
pub use rules::{PassRules, TriageRules, ACTION_URL, PRICE, TELEGRAM_HANDLE};
pub use score::{classify, score, triage_split, Classification, TriageSplit};

use crate::config::TriageConfig;
use crate::records::{PostRecord, ThreadRecord};
use crate::storage::read_records;
use crate::DarkwatchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Characters of the first post shown in the CSV summary
pub const SNIPPET_CHARS: usize = 160;

pub const SUMMARY_HEADER: [&str; 6] = ["url", "title", "post_count", "tags", "telegram", "first_snippet"];

/// Contact handles found in a thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub telegram: Vec<String>,
}

/// A thread after filtering, with extracted signals
///
/// Built fresh from a [`ThreadRecord`]; the source record is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    pub source: String,
    /// URL as crawled
    pub thread_url: String,
    /// URL with trailing pagination stripped
    pub canon_url: String,
    /// Normalized title
    pub title: String,
    /// Title as crawled, before normalization
    pub raw_title: Option<String>,
    pub thread_hash: String,
    pub fetched_at: DateTime<Utc>,
    pub post_count: usize,
    pub posts: Vec<PostRecord>,
    pub tags: Vec<String>,
    pub contacts: Contacts,
    pub prices: Vec<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

impl TriageRecord {
    /// One CSV summary row: `url,title,post_count,tags,telegram,first_snippet`
    pub fn summary_row(&self) -> [String; 6] {
        let url = if self.canon_url.is_empty() {
            self.thread_url.clone()
        } else {
            self.canon_url.clone()
        };
        let snippet: String = self
            .posts
            .first()
            .map(|p| p.content.chars().take(SNIPPET_CHARS).collect::<String>())
            .unwrap_or_default()
            .replace('\n', " ");
        [
            url,
            self.title.clone(),
            self.post_count.to_string(),
            self.tags.join("|"),
            self.contacts.telegram.join(","),
            snippet,
        ]
    }
}

/// Which passes to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Strict,
    Relaxed,
    Dual,
}

impl PipelineKind {
    pub fn runs_strict(&self) -> bool {
        matches!(self, Self::Strict | Self::Dual)
    }

    pub fn runs_relaxed(&self) -> bool {
        matches!(self, Self::Relaxed | Self::Dual)
    }
}

impl FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            "dual" => Ok(Self::Dual),
            other => Err(format!("unknown pipeline '{}' (strict, relaxed, dual)", other)),
        }
    }
}

/// Output file paths for one input log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageOutputs {
    pub strict_filtered: PathBuf,
    pub strict_summary: PathBuf,
    pub relaxed_filtered: PathBuf,
    pub relaxed_summary: PathBuf,
    pub relaxed_keep: PathBuf,
    pub relaxed_review: PathBuf,
    pub relaxed_drop_meta: PathBuf,
}

impl TriageOutputs {
    /// Names every output after the input stem, in the input's directory
    pub fn for_input(input: &Path) -> Self {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("crawl")
            .to_string();
        let named = |suffix: &str| input.with_file_name(format!("{}.{}", stem, suffix));
        Self {
            strict_filtered: named("strict.filtered.jsonl"),
            strict_summary: named("strict.summary.csv"),
            relaxed_filtered: named("relaxed.filtered.jsonl"),
            relaxed_summary: named("relaxed.summary.csv"),
            relaxed_keep: named("relaxed.keep.jsonl"),
            relaxed_review: named("relaxed.review.jsonl"),
            relaxed_drop_meta: named("relaxed.drop_meta.jsonl"),
        }
    }
}

/// Counts for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub total: usize,
    pub kept: usize,
}

/// Counts for the relaxed pass's classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub keep: usize,
    pub review: usize,
    pub drop: usize,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageSummary {
    pub input: PathBuf,
    pub outputs: TriageOutputs,
    pub strict: Option<PassSummary>,
    pub relaxed: Option<PassSummary>,
    pub split: Option<SplitSummary>,
}

/// Resolves `latest` to the newest crawl log in `log_dir`; anything else is a path
pub fn resolve_input(input: &str, log_dir: &Path) -> Result<PathBuf, DarkwatchError> {
    if input.eq_ignore_ascii_case("latest") {
        return crate::storage::latest_log(log_dir)?.ok_or_else(|| {
            DarkwatchError::Persistence(format!("no crawl log found in {}", log_dir.display()))
        });
    }
    let path = PathBuf::from(input);
    if !path.is_file() {
        return Err(DarkwatchError::Persistence(format!(
            "input log {} does not exist",
            path.display()
        )));
    }
    Ok(path)
}

/// Filters records through one pass
pub fn run_pass(records: &[ThreadRecord], pass: &PassRules, rules: &TriageRules) -> (Vec<TriageRecord>, PassSummary) {
    let mut filter = FilterPass::new(pass, rules);
    let kept: Vec<TriageRecord> = records.iter().filter_map(|r| filter.apply(r)).collect();
    let summary = PassSummary {
        total: filter.total,
        kept: filter.kept,
    };
    (kept, summary)
}

/// Runs the selected passes over a crawl log and writes every output
///
/// # Arguments
///
/// * `input` - Crawl log to read
/// * `kind` - Which passes to run
/// * `config` - Triage rules and thresholds
///
/// # Returns
///
/// * `Ok(TriageSummary)` - Outputs written
/// * `Err(DarkwatchError)` - Bad patterns, unreadable input, or unwritable outputs
pub fn run_pipeline(
    input: &Path,
    kind: PipelineKind,
    config: &TriageConfig,
) -> Result<TriageSummary, DarkwatchError> {
    let rules = TriageRules::compile(config)?;
    let records = read_records(input)?;
    let outputs = TriageOutputs::for_input(input);
    tracing::info!("Triage of {} record(s) from {}", records.len(), input.display());

    let mut summary = TriageSummary {
        input: input.to_path_buf(),
        outputs: outputs.clone(),
        strict: None,
        relaxed: None,
        split: None,
    };

    if kind.runs_strict() {
        let pass = PassRules::compile("strict", &config.strict)?;
        let (kept, counts) = run_pass(&records, &pass, &rules);
        write_jsonl(&outputs.strict_filtered, &kept)?;
        write_summary_csv(&outputs.strict_summary, &kept)?;
        tracing::info!(
            "[STRICT] total={}, kept={}, out={}",
            counts.total,
            counts.kept,
            outputs.strict_filtered.display()
        );
        summary.strict = Some(counts);
    }

    if kind.runs_relaxed() {
        let pass = PassRules::compile("relaxed", &config.relaxed)?;
        let (kept, counts) = run_pass(&records, &pass, &rules);
        write_jsonl(&outputs.relaxed_filtered, &kept)?;
        write_summary_csv(&outputs.relaxed_summary, &kept)?;
        tracing::info!(
            "[RELAXED] total={}, kept={}, out={}",
            counts.total,
            counts.kept,
            outputs.relaxed_filtered.display()
        );

        let split = triage_split(&kept, &rules);
        write_jsonl(&outputs.relaxed_keep, &split.keep)?;
        write_jsonl(&outputs.relaxed_review, &split.review)?;
        write_jsonl(&outputs.relaxed_drop_meta, &split.drop_meta)?;
        tracing::info!(
            "[TRIAGE] keep={}, review={}, drop_meta={}",
            split.keep.len(),
            split.review.len(),
            split.drop_meta.len()
        );

        summary.relaxed = Some(counts);
        summary.split = Some(SplitSummary {
            keep: split.keep.len(),
            review: split.review.len(),
            drop: split.drop_meta.len(),
        });
    }

    Ok(summary)
}

/// Writes records as JSON Lines, replacing any existing file
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), DarkwatchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the flat summary table
pub fn write_summary_csv(path: &Path, records: &[TriageRecord]) -> Result<(), DarkwatchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(SUMMARY_HEADER)?;
    for record in records {
        writer.write_record(record.summary_row())?;
    }
    writer.flush()?;
    Ok(())
}
