//! Resolution of forum-style post timestamps to absolute times

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(hour|minute)s?\s+ago").unwrap());
static FORUM_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}-\d{2}-\d{2}),\s+(\d{1,2}:\d{2}\s+[AP]M)").unwrap());

/// Resolves a displayed post time against the fetch time
///
/// Understands RFC 3339, `Yesterday`, `N hours ago`, `N minutes ago` and
/// `dd-mm-yy, h:mm AM`. Anything else resolves to `fetched_at`.
pub fn resolve_posted_at(posted_at: &str, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
    let trimmed = posted_at.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed.with_timezone(&Utc);
    }

    let lower = trimmed.to_lowercase();
    if lower.contains("yesterday") {
        return fetched_at - Duration::days(1);
    }

    if let Some(caps) = RELATIVE_AGO.captures(&lower) {
        if let Ok(value) = caps[1].parse::<i64>() {
            return match &caps[2] {
                "hour" => fetched_at - Duration::hours(value),
                _ => fetched_at - Duration::minutes(value),
            };
        }
    }

    if let Some(caps) = FORUM_DATETIME.captures(trimmed) {
        let joined = format!("{} {}", &caps[1], &caps[2]);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%d-%m-%y %I:%M %p") {
            return naive.and_utc();
        }
    }

    fetched_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 17, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_iso() {
        assert_eq!(
            resolve_posted_at("2024-08-01T10:00:00Z", fetched()),
            Utc.with_ymd_and_hms(2024, 8, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_relative_forms() {
        assert_eq!(
            resolve_posted_at("Yesterday, 09:15 PM", fetched()),
            Utc.with_ymd_and_hms(2024, 8, 16, 18, 0, 0).unwrap()
        );
        assert_eq!(
            resolve_posted_at("3 hours ago", fetched()),
            Utc.with_ymd_and_hms(2024, 8, 17, 15, 0, 0).unwrap()
        );
        assert_eq!(
            resolve_posted_at("1 minute ago", fetched()),
            Utc.with_ymd_and_hms(2024, 8, 17, 17, 59, 0).unwrap()
        );
    }

    #[test]
    fn test_forum_datetime() {
        assert_eq!(
            resolve_posted_at("05-08-24, 07:30 PM", fetched()),
            Utc.with_ymd_and_hms(2024, 8, 5, 19, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_falls_back_to_fetch_time() {
        assert_eq!(resolve_posted_at("a while back", fetched()), fetched());
        assert_eq!(resolve_posted_at("", fetched()), fetched());
    }
}
