use crate::config::types::{
    BatchConfig, Config, CrawlerConfig, FetchConfig, ForumProfile, PassSettings,
    QuarantineConfig, TriageConfig,
};
use crate::ConfigError;
use regex::Regex;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_quarantine_config(&config.quarantine)?;
    validate_triage_config(&config.triage)?;
    validate_batch_config(&config.batch)?;
    for (key, profile) in &config.forums {
        validate_forum_profile(key, profile)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.delay_min_ms > config.delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "delay-min-ms ({}) must not exceed delay-max-ms ({})",
            config.delay_min_ms, config.delay_max_ms
        )));
    }

    Ok(())
}

/// Validates fetch engine configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.max_html_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-html-bytes must be > 0".to_string(),
        ));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max-retries must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs == 0 || config.render_deadline_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs and render-deadline-secs must be > 0".to_string(),
        ));
    }

    validate_proxy_endpoint("lightweight-proxy", &config.lightweight_proxy)?;
    validate_proxy_endpoint("browser-proxy", &config.browser_proxy)?;

    Ok(())
}

/// Proxy endpoints are `host:port`
fn validate_proxy_endpoint(name: &str, endpoint: &str) -> Result<(), ConfigError> {
    let valid = endpoint
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false);

    if !valid {
        return Err(ConfigError::Validation(format!(
            "{} must be host:port, got '{}'",
            name, endpoint
        )));
    }
    Ok(())
}

fn validate_quarantine_config(config: &QuarantineConfig) -> Result<(), ConfigError> {
    if config.max_file_bytes == 0 {
        return Err(ConfigError::Validation(
            "quarantine max-file-bytes must be > 0".to_string(),
        ));
    }
    if config.archiver.trim().is_empty() {
        return Err(ConfigError::Validation(
            "quarantine archiver cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates triage thresholds and that every pattern compiles
fn validate_triage_config(config: &TriageConfig) -> Result<(), ConfigError> {
    if config.drop_threshold > config.keep_threshold {
        return Err(ConfigError::Validation(format!(
            "drop-threshold ({}) must not exceed keep-threshold ({})",
            config.drop_threshold, config.keep_threshold
        )));
    }

    for (tag, patterns) in &config.keywords {
        for pattern in patterns {
            validate_regex(&format!("keywords.{}", tag), pattern)?;
        }
    }

    validate_pass("strict", &config.strict)?;
    validate_pass("relaxed", &config.relaxed)?;

    Ok(())
}

fn validate_pass(name: &str, pass: &PassSettings) -> Result<(), ConfigError> {
    for pattern in &pass.exclude_url_patterns {
        validate_regex(&format!("{}.exclude-url-patterns", name), pattern)?;
    }
    Ok(())
}

fn validate_regex(field: &str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("{} '{}': {}", field, pattern, e)))
}

fn validate_batch_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.max_page < 1 || config.chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch max-page and chunk-size must be >= 1, got {} and {}",
            config.max_page, config.chunk_size
        )));
    }

    if config.lightweight_attempts < 1 {
        return Err(ConfigError::Validation(
            "batch lightweight-attempts must be >= 1".to_string(),
        ));
    }

    if config.retry_backoff_min_ms > config.retry_backoff_max_ms
        || config.chunk_pause_min_ms > config.chunk_pause_max_ms
    {
        return Err(ConfigError::Validation(
            "batch backoff/pause minimums must not exceed their maximums".to_string(),
        ));
    }

    if let Some(argv) = &config.circuit_refresh {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(ConfigError::Validation(
                "batch circuit-refresh must name a program".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates a forum profile: seeds, required fields, selector syntax
fn validate_forum_profile(key: &str, profile: &ForumProfile) -> Result<(), ConfigError> {
    if profile.list_urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Forum '{}' must have at least one list URL",
            key
        )));
    }

    for (field, list) in [
        ("thread-link", &profile.thread_link),
        ("post-container", &profile.post_container),
        ("content", &profile.content),
    ] {
        if list.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Forum '{}' must define at least one '{}' selector",
                key, field
            )));
        }
    }

    profile.compile(key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SelectorList;

    fn valid_profile() -> ForumProfile {
        ForumProfile {
            list_urls: vec!["http://forum.onion/list".to_string()],
            thread_link: ["a.thread"].into(),
            post_container: ["div.post"].into(),
            content: ["div.body"].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_delay_bounds() {
        let mut config = Config::default();
        config.crawler.delay_min_ms = 3000;
        config.crawler.delay_max_ms = 1000;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_proxy_endpoint() {
        let mut config = Config::default();
        config.fetch.lightweight_proxy = "127.0.0.1".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_threshold_order() {
        let mut config = Config::default();
        config.triage.drop_threshold = 5;
        config.triage.keep_threshold = 2;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_keyword_regex() {
        let mut config = Config::default();
        config
            .triage
            .keywords
            .insert("broken".to_string(), vec!["(unclosed".to_string()]);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_forum_requires_core_selectors() {
        let mut config = Config::default();
        let mut profile = valid_profile();
        profile.content = SelectorList::default();
        config.forums.insert("df".to_string(), profile);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_forum_requires_seed() {
        let mut config = Config::default();
        let mut profile = valid_profile();
        profile.list_urls.clear();
        config.forums.insert("df".to_string(), profile);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_valid_forum() {
        let mut config = Config::default();
        config.forums.insert("df".to_string(), valid_profile());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_circuit_refresh() {
        let mut config = Config::default();
        config.batch.circuit_refresh = Some(vec![]);
        assert!(validate(&config).is_err());
    }
}
