//! Heuristic scoring and keep/review/drop classification

use crate::triage::rules::{TriageRules, ACTION_URL};
use crate::triage::TriageRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First-post length that earns a point
const SUBSTANTIAL_POST_CHARS: usize = 80;

/// Post count that earns a point
const ACTIVE_THREAD_POSTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Keep,
    Review,
    Drop,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Review => "review",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores a filtered record
///
/// +2 high-value tag, +1 contact handle, +1 substantial first post,
/// +1 active thread, -2 challenge title (before normalization), -1 action URL.
pub fn score(record: &TriageRecord, rules: &TriageRules) -> i32 {
    let mut score = 0;

    if record.tags.iter().any(|t| rules.high_value_tags.contains(t)) {
        score += 2;
    }
    if !record.contacts.telegram.is_empty() {
        score += 1;
    }
    let first_len = record
        .posts
        .first()
        .map_or(0, |p| p.content.chars().count());
    if first_len >= SUBSTANTIAL_POST_CHARS {
        score += 1;
    }
    if record.post_count >= ACTIVE_THREAD_POSTS {
        score += 1;
    }

    if rules.is_challenge_title(record.raw_title.as_deref()) {
        score -= 2;
    }
    if ACTION_URL.is_match(&record.thread_url) {
        score -= 1;
    }

    score
}

/// `keep` at or above the keep threshold, `drop` below the drop threshold
pub fn classify(score: i32, rules: &TriageRules) -> Classification {
    if score >= rules.keep_threshold {
        Classification::Keep
    } else if score < rules.drop_threshold {
        Classification::Drop
    } else {
        Classification::Review
    }
}

/// Records split by classification
#[derive(Debug, Default)]
pub struct TriageSplit {
    pub keep: Vec<TriageRecord>,
    pub review: Vec<TriageRecord>,
    /// Dropped records keep their metadata; posts are cleared
    pub drop_meta: Vec<TriageRecord>,
}

/// Scores and classifies every record, clearing posts of dropped ones
pub fn triage_split(records: &[TriageRecord], rules: &TriageRules) -> TriageSplit {
    let mut split = TriageSplit::default();

    for record in records {
        let value = score(record, rules);
        let class = classify(value, rules);
        let mut scored = record.clone();
        scored.score = Some(value);
        scored.classification = Some(class);

        match class {
            Classification::Keep => split.keep.push(scored),
            Classification::Review => split.review.push(scored),
            Classification::Drop => {
                scored.posts.clear();
                split.drop_meta.push(scored);
            }
        }
    }

    split
}
