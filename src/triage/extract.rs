//! Tag, contact-handle and price extraction

use crate::triage::rules::{TriageRules, PRICE, TELEGRAM_HANDLE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A monetary amount found in text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Upper-cased currency code; `$` is reported as `USD`
    pub currency: Option<String>,
    pub value: u64,
}

/// Categories whose patterns match anywhere in `text`, sorted
pub fn tag_keywords(text: &str, rules: &TriageRules) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let tags: BTreeSet<String> = rules
        .keywords
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
        .map(|(tag, _)| tag.clone())
        .collect();
    tags.into_iter().collect()
}

/// Distinct `@handle` mentions, sorted
pub fn telegram_handles(text: &str) -> Vec<String> {
    let handles: BTreeSet<String> = TELEGRAM_HANDLE
        .captures_iter(text)
        .map(|caps| format!("@{}", &caps[1]))
        .collect();
    handles.into_iter().collect()
}

/// Every amount in text order; thousands separators are dropped
pub fn extract_prices(text: &str) -> Vec<Price> {
    PRICE
        .captures_iter(text)
        .filter_map(|caps| {
            let digits: String = caps[2].chars().filter(|c| c.is_ascii_digit()).collect();
            let value = digits.parse::<u64>().ok()?;
            let currency = caps.get(1).map(|m| match m.as_str() {
                "$" => "USD".to_string(),
                code => code.to_ascii_uppercase(),
            });
            Some(Price { currency, value })
        })
        .collect()
}
