//! Opt-in quarantine downloader
//!
//! Fetches attachment files referenced by thread records into an isolated
//! folder per thread. Nothing here runs unless `[quarantine].enabled` is set.
//! Every saved file gets an inert suffix, is hashed while streaming, and is
//! listed in the thread's `manifest.json`. Downloaded files are never opened,
//! rendered, or executed.

mod archive;
mod manifest;
mod sanitize;

pub use archive::{archive_folder, archive_path, zip_folder, ArchiveOutcome};
pub use manifest::{DownloadedArtifact, QuarantineManifest, MANIFEST_FILE};
pub use sanitize::{
    filename_from_disposition, filename_from_url, sanitize_filename, unique_inert_path,
    FALLBACK_NAME, INERT_SUFFIX, PARTIAL_SUFFIX,
};

use crate::config::{FetchConfig, QuarantineConfig};
use crate::crawler::media_type;
use crate::records::{sha256_hex, ThreadRecord};
use crate::storage::RecordSink;
use crate::url::same_host;
use crate::DarkwatchError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use reqwest::{redirect::Policy, Client, Proxy};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Content types that are pages, not files; such responses are skipped
pub const SAFE_TEXT_CONTENT_TYPES: [&str; 4] = [
    "text/html",
    "application/xhtml+xml",
    "text/plain",
    "text/markdown",
];

/// Result of one attachment download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(DownloadedArtifact),
    Skipped(String),
}

/// Quarantine downloader
pub struct QuarantineDownloader {
    client: Client,
    config: QuarantineConfig,
    archived: Vec<ArchiveOutcome>,
}

impl QuarantineDownloader {
    /// Creates a downloader with its own HTTP client
    ///
    /// The client follows redirects (bounded by `max-redirects`) and goes
    /// through the lightweight SOCKS endpoint when the proxy is enabled.
    /// With `same-host` set, a redirect to another host is never requested.
    pub fn new(config: &QuarantineConfig, fetch: &FetchConfig) -> Result<Self, DarkwatchError> {
        let max_redirects = fetch.max_redirects as usize;
        let policy = if config.same_host {
            same_host_policy(max_redirects)
        } else {
            Policy::limited(max_redirects)
        };
        let mut builder = Client::builder()
            .user_agent(fetch.user_agent.clone())
            .timeout(Duration::from_secs(fetch.timeout_secs.max(45)))
            .redirect(policy);
        if fetch.use_proxy {
            builder = builder.proxy(Proxy::all(format!("socks5h://{}", fetch.lightweight_proxy))?);
        }

        tracing::warn!(
            "Quarantine download enabled, files go to {}. NEVER execute downloaded files.",
            config.out_dir.display()
        );

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
            archived: Vec::new(),
        })
    }

    /// Archives written so far
    pub fn archived(&self) -> &[ArchiveOutcome] {
        &self.archived
    }

    /// Folder for one thread: `<out-dir>/<sanitized source>/<thread hash>`
    pub fn thread_folder(&self, record: &ThreadRecord) -> PathBuf {
        let hash = if record.thread_hash.is_empty() {
            sha256_hex(&record.thread_url)
        } else {
            record.thread_hash.clone()
        };
        self.config
            .out_dir
            .join(sanitize_filename(&record.source, "src"))
            .join(sanitize_filename(&hash, "thread"))
    }

    /// Downloads up to `max-per-thread` attachments of a thread
    ///
    /// Single-attachment failures are logged and skipped. Threads without
    /// attachment URLs produce no folder.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(manifest))` - The thread had attachments; manifest written
    /// * `Ok(None)` - Nothing to download
    /// * `Err(DarkwatchError)` - The thread folder or manifest could not be written
    pub async fn download_thread(
        &mut self,
        record: &ThreadRecord,
    ) -> Result<Option<QuarantineManifest>, DarkwatchError> {
        let urls: Vec<String> = record.attachment_urls().map(str::to_string).collect();
        if urls.is_empty() {
            return Ok(None);
        }

        let folder = self.thread_folder(record);
        tokio::fs::create_dir_all(&folder).await?;

        let mut manifest = QuarantineManifest::new(&record.thread_url);
        for raw in &urls {
            if manifest.downloaded.len() >= self.config.max_per_thread {
                tracing::info!(
                    "Per-thread cap of {} reached for {}",
                    self.config.max_per_thread,
                    record.thread_url
                );
                break;
            }

            match self.download_one(raw, &record.thread_url, &folder).await {
                Ok(DownloadOutcome::Saved(artifact)) => {
                    tracing::info!(url = %raw, sha256 = %artifact.sha256, "Quarantined {} bytes", artifact.size);
                    manifest.downloaded.push(artifact);
                }
                Ok(DownloadOutcome::Skipped(reason)) => {
                    tracing::info!(url = %raw, "Skipped attachment: {}", reason);
                }
                Err(e) => tracing::warn!(url = %raw, "Attachment download failed: {}", e),
            }
        }

        manifest.write(&folder)?;

        if self.config.archive {
            let outcome = archive_folder(
                &folder,
                self.config.archive_password.as_deref(),
                &self.config.archiver,
            )
            .await?;
            tracing::info!("Quarantine archived: {}", outcome.path().display());
            self.archived.push(outcome);
        }

        Ok(Some(manifest))
    }

    /// Streams one attachment into the thread folder
    ///
    /// Checks, in order: URL scheme, same-host restriction, response status,
    /// safe-text content type, declared length, streamed length.
    pub async fn download_one(
        &self,
        raw_url: &str,
        thread_url: &str,
        folder: &Path,
    ) -> Result<DownloadOutcome, DarkwatchError> {
        let url = Url::parse(raw_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Ok(skip(format!("scheme '{}' not allowed", url.scheme())));
        }
        if self.config.same_host && !same_host(url.as_str(), thread_url) {
            return Ok(skip("cross-host attachment blocked"));
        }

        let mut response = self.client.get(url.clone()).send().await?;
        if self.config.same_host
            && (response.status().is_redirection() || !same_host(response.url().as_str(), thread_url))
        {
            return Ok(skip("redirected off the thread host"));
        }
        if !response.status().is_success() {
            return Ok(skip(format!("HTTP {}", response.status().as_u16())));
        }

        let content_type = media_type(response.headers());
        if SAFE_TEXT_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Ok(skip(format!("safe-text content type {}", content_type)));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(length) = declared.filter(|l| *l > self.config.max_file_bytes) {
            return Ok(skip(format!(
                "declared size {} exceeds {} bytes",
                length, self.config.max_file_bytes
            )));
        }

        let suggested = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(&url))
            .unwrap_or_default();
        let name = sanitize_filename(&suggested, FALLBACK_NAME);
        let final_path = unique_inert_path(folder, &name);
        let part_path = folder.join(format!("{}{}", name, PARTIAL_SUFFIX));

        let mut file = tokio::fs::File::create(&part_path).await?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&part_path).await;
                    return Err(e.into());
                }
            };
            size += chunk.len() as u64;
            if size > self.config.max_file_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&part_path).await;
                return Ok(skip(format!(
                    "exceeded {} bytes while streaming",
                    self.config.max_file_bytes
                )));
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part_path, &final_path).await?;

        Ok(DownloadOutcome::Saved(DownloadedArtifact {
            url: raw_url.to_string(),
            saved_path: final_path.to_string_lossy().into_owned(),
            sha256: hex::encode(hasher.finalize()),
            size,
            content_type,
        }))
    }
}

/// Follows redirects only while they stay on the host of the first request
///
/// A hop to another host stops the chain, leaving the 3xx response as the
/// final one, so the off-host target is never contacted.
fn same_host_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error("too many redirects");
        }
        let stays = attempt
            .previous()
            .first()
            .map_or(false, |origin| same_host(origin.as_str(), attempt.url().as_str()));
        if stays {
            attempt.follow()
        } else {
            tracing::warn!("Blocked cross-host redirect to {}", attempt.url());
            attempt.stop()
        }
    })
}

fn skip(reason: impl Into<String>) -> DownloadOutcome {
    DownloadOutcome::Skipped(reason.into())
}

#[async_trait]
impl RecordSink for QuarantineDownloader {
    async fn accept(&mut self, record: &ThreadRecord) -> Result<(), DarkwatchError> {
        if let Err(e) = self.download_thread(record).await {
            tracing::warn!("Quarantine pass failed for {}: {}", record.thread_url, e);
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), DarkwatchError> {
        let fallbacks = self
            .archived
            .iter()
            .filter(|o| matches!(o, ArchiveOutcome::UnprotectedFallback { .. }))
            .count();
        if fallbacks > 0 {
            tracing::warn!(
                "{} quarantine archive(s) were written WITHOUT password protection",
                fallbacks
            );
        }
        Ok(())
    }
}
