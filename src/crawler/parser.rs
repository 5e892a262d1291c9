//! Selector-driven structural parser
//!
//! This module turns fetched HTML into typed records using a forum's
//! [`CompiledProfile`]. Every logical field is resolved the same way, by
//! [`resolve_field`]: candidate selectors are tried in order and the first one
//! that matches anything wins. Post-level fields are resolved inside each
//! matched post container so page chrome cannot leak into post content.
//!
//! Parsing is synchronous and never holds a DOM across an await point.

use crate::config::CompiledProfile;
use crate::records::{thread_fingerprint, AttachmentRef, PostRecord, ThreadRecord};
use crate::url::{is_attachment_url, resolve_href};
use chrono::{DateTime, SecondsFormat, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Links extracted from one list page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    /// Thread URLs in page order, deduplicated, attachment-shaped URLs removed
    pub thread_links: Vec<Url>,

    /// Resolved next-page link, if any
    pub next_page: Option<Url>,
}

/// Resolves one logical field against a scope node
///
/// Tries each candidate selector in order and returns every match of the
/// first selector that matches at least one element.
///
/// # Arguments
///
/// * `scope` - The node to search within (document root or a post container)
/// * `candidates` - Ordered candidate selectors
///
/// # Returns
///
/// * `Some(matches)` - Non-empty matches of the winning selector
/// * `None` - No candidate matched
pub fn resolve_field<'a>(scope: ElementRef<'a>, candidates: &[Selector]) -> Option<Vec<ElementRef<'a>>> {
    candidates.iter().find_map(|selector| {
        let matches: Vec<ElementRef<'a>> = scope.select(selector).collect();
        if matches.is_empty() {
            None
        } else {
            Some(matches)
        }
    })
}

/// Extracts thread links and the next-page link from a list page
///
/// # Example
///
/// ```no_run
/// use darkwatch::crawler::parse_list_page;
/// # fn example(profile: &darkwatch::config::CompiledProfile) {
/// let base = url::Url::parse("http://forum.onion/Forum-Leaks").unwrap();
/// let page = parse_list_page("<html>...</html>", &base, profile);
/// println!("{} threads", page.thread_links.len());
/// # }
/// ```
pub fn parse_list_page(html: &str, base_url: &Url, profile: &CompiledProfile) -> ListPage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut thread_links: Vec<Url> = Vec::new();
    match resolve_field(root, &profile.thread_link) {
        Some(matches) => {
            for element in matches {
                let Some(url) = href_of(element).and_then(|h| resolve_href(h, base_url)) else {
                    continue;
                };
                if is_attachment_url(url.as_str()) {
                    tracing::debug!("Skipping attachment-shaped thread link {}", url);
                    continue;
                }
                if !thread_links.contains(&url) {
                    thread_links.push(url);
                }
            }
        }
        None => tracing::debug!(field = "thread-link", url = %base_url, "No selector matched"),
    }

    let next_page = resolve_field(root, &profile.next_page)
        .and_then(|matches| matches.into_iter().find_map(href_of))
        .and_then(|href| resolve_href(href, base_url))
        .filter(|url| !is_attachment_url(url.as_str()));

    ListPage {
        thread_links,
        next_page,
    }
}

/// Parses a thread page into a [`ThreadRecord`]
///
/// Missing fields degrade to `None` or best-effort values; parsing itself
/// never fails. The title is `None` when no selector matches and is never
/// synthesized from the URL here.
///
/// # Arguments
///
/// * `html` - The thread page HTML
/// * `thread_url` - URL the page was fetched from (base for relative links)
/// * `profile` - The forum's compiled profile
/// * `fetched_at` - Fetch time, also the fallback post timestamp
pub fn parse_thread(
    html: &str,
    thread_url: &Url,
    profile: &CompiledProfile,
    fetched_at: DateTime<Utc>,
) -> ThreadRecord {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let fetched_str = fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let title = resolve_field(root, &profile.thread_title)
        .and_then(|matches| matches.into_iter().next())
        .map(element_text)
        .filter(|t| !t.is_empty());
    if title.is_none() {
        tracing::debug!(field = "thread-title", url = %thread_url, "No selector matched");
    }

    let mut posts = Vec::new();
    match resolve_field(root, &profile.post_container) {
        Some(containers) => {
            for container in containers {
                posts.push(parse_post(container, thread_url, profile, &fetched_str));
            }
        }
        None => tracing::debug!(field = "post-container", url = %thread_url, "No selector matched"),
    }

    let thread_hash = thread_fingerprint(title.as_deref(), &posts);

    ThreadRecord {
        source: profile.key.clone(),
        thread_url: thread_url.to_string(),
        title,
        posts,
        fetched_at,
        thread_hash,
    }
}

/// Resolves the post-level fields inside one post container
fn parse_post(
    container: ElementRef<'_>,
    thread_url: &Url,
    profile: &CompiledProfile,
    fetched_at: &str,
) -> PostRecord {
    let content = resolve_field(container, &profile.content)
        .map(|matches| {
            matches
                .into_iter()
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let author = resolve_field(container, &profile.author)
        .and_then(|matches| matches.into_iter().next())
        .map(element_text)
        .filter(|t| !t.is_empty());

    let posted_at = resolve_field(container, &profile.posted_time)
        .and_then(|matches| matches.into_iter().next())
        .and_then(timestamp_of)
        .unwrap_or_else(|| fetched_at.to_string());

    let post_url = resolve_field(container, &profile.post_permalink)
        .and_then(|matches| matches.into_iter().find_map(href_of))
        .and_then(|href| resolve_href(href, thread_url))
        .filter(|url| !is_attachment_url(url.as_str()))
        .map(|url| url.to_string())
        .unwrap_or_else(|| thread_url.to_string());

    let attachments = parse_attachments(container, thread_url, profile);

    if content.is_empty() {
        tracing::debug!(field = "content", url = %thread_url, "No selector matched in post container");
    }

    PostRecord {
        post_url,
        author,
        posted_at,
        content,
        attachments,
    }
}

/// Reads attachment display metadata; never fetches anything
fn parse_attachments(
    container: ElementRef<'_>,
    thread_url: &Url,
    profile: &CompiledProfile,
) -> Vec<AttachmentRef> {
    let Some(blocks) = resolve_field(container, &profile.attachment_block) else {
        return Vec::new();
    };

    blocks
        .into_iter()
        .filter_map(|block| {
            let anchor_text = anchor_of(block).map(element_text).filter(|t| !t.is_empty());
            let display_filename = resolve_field(block, &profile.attachment_name)
                .and_then(|m| m.into_iter().next())
                .map(element_text)
                .filter(|t| !t.is_empty())
                .or(anchor_text);
            let display_size = resolve_field(block, &profile.attachment_size)
                .and_then(|m| m.into_iter().next())
                .map(element_text)
                .filter(|t| !t.is_empty());
            let attachment_url = href_of(block)
                .and_then(|href| resolve_href(href, thread_url))
                .map(|url| url.to_string());

            if display_filename.is_none() && attachment_url.is_none() {
                return None;
            }
            Some(AttachmentRef {
                display_filename,
                display_size,
                attachment_url,
            })
        })
        .collect()
}

/// Whitespace-normalized text content of an element
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The element itself if it is a link, else its first descendant link
fn anchor_of(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if element.value().attr("href").is_some() {
        return Some(element);
    }
    let a_selector = Selector::parse("a[href]").ok()?;
    element.select(&a_selector).next()
}

fn href_of(element: ElementRef<'_>) -> Option<&str> {
    anchor_of(element).and_then(|a| a.value().attr("href"))
}

/// Prefers a machine-readable attribute, then the visible text
fn timestamp_of(element: ElementRef<'_>) -> Option<String> {
    for attr in ["datetime", "data-timestamp", "title"] {
        if let Some(value) = element.value().attr(attr) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    Some(element_text(element)).filter(|t| !t.is_empty())
}
