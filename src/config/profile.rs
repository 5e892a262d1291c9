//! Compiled forum profiles
//!
//! A [`ForumProfile`] holds selector strings as written by operators; the
//! crawler works with a [`CompiledProfile`] whose selectors are parsed once
//! per run.

use crate::config::types::{Config, ForumProfile, SelectorList};
use crate::crawler::FetchStrategy;
use crate::url::{parse_http_url, with_page_param};
use crate::{ConfigError, DarkwatchError};
use scraper::Selector;
use url::Url;

/// A forum profile with parsed seed URLs and selectors
#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub key: String,
    pub list_urls: Vec<Url>,
    pub engine: Option<FetchStrategy>,
    pub thread_link: Vec<Selector>,
    pub thread_title: Vec<Selector>,
    pub post_container: Vec<Selector>,
    pub content: Vec<Selector>,
    pub author: Vec<Selector>,
    pub posted_time: Vec<Selector>,
    pub post_permalink: Vec<Selector>,
    pub attachment_block: Vec<Selector>,
    pub attachment_name: Vec<Selector>,
    pub attachment_size: Vec<Selector>,
    pub next_page: Vec<Selector>,
}

impl ForumProfile {
    /// Parses every seed URL and candidate selector
    ///
    /// Blank selector strings are skipped. An unparsable selector is a
    /// configuration error rather than a silent miss at crawl time.
    ///
    /// # Arguments
    ///
    /// * `key` - The forum key this profile is registered under
    ///
    /// # Returns
    ///
    /// * `Ok(CompiledProfile)` - All selectors and URLs parsed
    /// * `Err(ConfigError)` - A URL or selector is invalid
    pub fn compile(&self, key: &str) -> Result<CompiledProfile, ConfigError> {
        let list_urls = self
            .list_urls
            .iter()
            .map(|raw| {
                parse_http_url(raw).map_err(|e| {
                    ConfigError::InvalidUrl(format!("forum '{}' list URL '{}': {}", key, raw, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let field = |name: &str, list: &SelectorList| compile_selectors(key, name, list);

        Ok(CompiledProfile {
            key: key.to_string(),
            list_urls,
            engine: self.engine,
            thread_link: field("thread-link", &self.thread_link)?,
            thread_title: field("thread-title", &self.thread_title)?,
            post_container: field("post-container", &self.post_container)?,
            content: field("content", &self.content)?,
            author: field("author", &self.author)?,
            posted_time: field("posted-time", &self.posted_time)?,
            post_permalink: field("post-permalink", &self.post_permalink)?,
            attachment_block: field("attachment-block", &self.attachment_block)?,
            attachment_name: field("attachment-name", &self.attachment_name)?,
            attachment_size: field("attachment-size", &self.attachment_size)?,
            next_page: field("next-page", &self.next_page)?,
        })
    }

    /// Derives a profile whose seed URLs start at the given list page
    ///
    /// The `page` query parameter of every seed URL is replaced, or appended
    /// when absent. Seeds that fail to parse are kept unchanged and will be
    /// rejected by [`ForumProfile::compile`].
    pub fn with_start_page(&self, start_page: u32) -> ForumProfile {
        let mut scoped = self.clone();
        scoped.list_urls = self
            .list_urls
            .iter()
            .map(|raw| match Url::parse(raw) {
                Ok(url) => with_page_param(&url, start_page).to_string(),
                Err(_) => raw.clone(),
            })
            .collect();
        scoped
    }
}

impl Config {
    /// Looks up a forum profile by key
    ///
    /// A missing key yields [`DarkwatchError::ConfigMissing`]; callers skip
    /// that forum and carry on with the rest.
    pub fn forum(&self, key: &str) -> Result<&ForumProfile, DarkwatchError> {
        self.forums
            .get(key)
            .ok_or_else(|| DarkwatchError::ConfigMissing(key.to_string()))
    }
}

fn compile_selectors(
    forum: &str,
    field: &str,
    list: &SelectorList,
) -> Result<Vec<Selector>, ConfigError> {
    list.0
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            Selector::parse(s).map_err(|_| ConfigError::InvalidSelector {
                forum: forum.to_string(),
                field: field.to_string(),
                selector: s.to_string(),
            })
        })
        .collect()
}
