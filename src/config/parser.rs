use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use darkwatch::config::load_config;
///
/// let config = load_config(Path::new("darkwatch.toml")).unwrap();
/// println!("Pages per seed: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates a configuration document held in memory
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup and printed by `check`.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::FetchStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
[crawler]
max-pages = 3
delay-min-ms = 0
delay-max-ms = 10

[fetch]
use-proxy = true

[output]
log-path = "./out/df.jsonl"
sqlite-path = "./out/df.db"

[triage]
keep-threshold = 3

[forums.darkforums]
engine = "requests"
list-urls = ["http://forum.onion/Forum-Databases"]
thread-link = ["span.subject_new a", "a.thread-title"]
post-container = "div.post"
content = ["div.post_body"]
posted-time = "span.post_date"
next-page = "a.pagination_next"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_pages, 3);
        assert!(config.fetch.use_proxy);
        assert_eq!(config.fetch.lightweight_proxy, "127.0.0.1:9150");
        assert_eq!(config.triage.keep_threshold, 3);
        assert_eq!(config.triage.drop_threshold, 0);
        assert_eq!(config.forums.len(), 1);

        let forum = &config.forums["darkforums"];
        assert_eq!(forum.engine, Some(FetchStrategy::Lightweight));
        assert_eq!(forum.thread_link.0.len(), 2);
        assert_eq!(forum.post_container.0, vec!["div.post".to_string()]);
    }

    #[test]
    fn test_sections_default_when_absent() {
        let config = parse_config("").unwrap();
        assert_eq!(config.crawler.max_pages, 2);
        assert_eq!(config.fetch.max_html_bytes, 3_000_000);
        assert!(!config.quarantine.enabled);
        assert_eq!(config.batch.chunk_size, 200);
        assert!(config.forums.is_empty());
    }

    #[test]
    fn test_partial_pass_tables_keep_pass_defaults() {
        let config = parse_config(
            "[triage.strict]\nmin-chars = 30\n\n[triage.relaxed]\nallow-empty = false\n",
        )
        .unwrap();

        let strict = &config.triage.strict;
        assert_eq!(strict.min_chars, 30);
        assert!(!strict.keep_challenge);
        assert_eq!(
            strict.exclude_url_patterns,
            crate::config::PassSettings::strict().exclude_url_patterns
        );

        let relaxed = &config.triage.relaxed;
        assert!(!relaxed.allow_empty);
        assert_eq!(relaxed.min_chars, 5);
        assert!(relaxed.keep_challenge);
        assert_eq!(relaxed.exclude_url_patterns.len(), 3);
    }

    #[test]
    fn test_playwright_alias_maps_to_browser() {
        let content = VALID.replace("engine = \"requests\"", "engine = \"playwright\"");
        let config = parse_config(&content).unwrap();
        assert_eq!(
            config.forums["darkforums"].engine,
            Some(FetchStrategy::Browser)
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID.replace("max-pages = 3", "max-pages = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let content = VALID.replace("\"div.post\"", "\"div[[\"");
        let result = parse_config(&content);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidSelector { .. }
        ));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
