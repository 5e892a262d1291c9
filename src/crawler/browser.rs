//! Browser-automation fetch strategy
//!
//! Renders pages in headless Chromium for script-dependent forums. The
//! browser is launched lazily on the first fetch and reused; each fetch gets
//! its own tab which is closed on every exit path. Rendering is bounded by a
//! deadline so a hung page cannot block the run.

use crate::config::FetchConfig;
use crate::crawler::fetcher::{guard_size, guard_url, FetchStrategy, FetchedPage, Fetcher};
use crate::url::is_attachment_url;
use crate::FetchError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Upper bound on closing a tab, which must not hold up the next fetch
const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Headless browser strategy implementation
pub struct BrowserFetcher {
    proxy: Option<String>,
    chrome_path: Option<PathBuf>,
    settle: Duration,
    page_timeout: Duration,
    deadline: Duration,
    max_bytes: u64,
    session: Mutex<Option<Session>>,
}

impl BrowserFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            proxy: config.use_proxy.then(|| config.browser_proxy.clone()),
            chrome_path: config.chrome_path.clone(),
            settle: Duration::from_millis(config.browser_settle_ms),
            page_timeout: Duration::from_secs(config.timeout_secs),
            deadline: Duration::from_secs(config.render_deadline_secs),
            max_bytes: config.max_html_bytes,
            session: Mutex::new(None),
        }
    }

    /// Launch arguments passed to Chromium
    ///
    /// With a proxy configured, every hostname lookup outside loopback is
    /// forced to fail locally so DNS cannot leak around the SOCKS tunnel.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--ignore-certificate-errors".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-extensions".to_string(),
            "--disable-sync".to_string(),
            "--mute-audio".to_string(),
        ];
        if let Some(endpoint) = &self.proxy {
            args.push(format!("--proxy-server=socks5://{}", endpoint));
            args.push("--host-resolver-rules=MAP * ~NOTFOUND , EXCLUDE 127.0.0.1".to_string());
            args.push("--proxy-bypass-list=<-loopback>".to_string());
        }
        args
    }

    async fn launch(&self) -> Result<Session, FetchError> {
        info!("Launching headless browser");

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(self.page_timeout);
        for arg in self.launch_args() {
            builder = builder.arg(arg);
        }
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Browser(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Browser(format!("launch failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Session { browser, handler })
    }

    /// Opens a tab, renders, and always closes the tab afterwards
    async fn render(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let session = guard
            .as_ref()
            .ok_or_else(|| FetchError::Browser("browser session unavailable".to_string()))?;

        let page = tokio::time::timeout(self.page_timeout, session.browser.new_page("about:blank"))
            .await
            .map_err(|_| FetchError::DeadlineExceeded {
                url: url.to_string(),
            })?
            .map_err(|e| FetchError::Browser(format!("new tab failed: {}", e)))?;

        let outcome = match tokio::time::timeout(self.deadline, self.load(&page, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::DeadlineExceeded {
                url: url.to_string(),
            }),
        };

        match tokio::time::timeout(PAGE_CLOSE_TIMEOUT, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to close tab for {}: {}", url, e),
            Err(_) => warn!("Timed out closing tab for {}", url),
        }

        outcome
    }

    async fn load(&self, page: &Page, url: &Url) -> Result<FetchedPage, FetchError> {
        page.goto(url.as_str())
            .await
            .map_err(|e| FetchError::Browser(format!("navigation to {} failed: {}", url, e)))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| FetchError::Browser(format!("load of {} failed: {}", url, e)))?;

        // Script-rendered forums keep filling the DOM after DOMContentLoaded
        tokio::time::sleep(self.settle).await;

        let final_url = match page.url().await {
            Ok(Some(current)) => Url::parse(&current).unwrap_or_else(|_| url.clone()),
            _ => url.clone(),
        };
        if is_attachment_url(final_url.as_str()) {
            return Err(FetchError::BlockedUrl {
                url: final_url.to_string(),
                reason: "navigation ended on attachment-shaped URL".to_string(),
            });
        }

        let html = page
            .content()
            .await
            .map_err(|e| FetchError::Browser(format!("reading {} failed: {}", url, e)))?;
        guard_size(url, html.len(), self.max_bytes)?;

        Ok(FetchedPage { final_url, html })
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Browser
    }

    async fn fetch_html(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        guard_url(url)?;
        self.render(url).await
    }

    /// Closes the browser and stops its event handler
    async fn shutdown(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            if let Err(e) = session.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            let _ = session.browser.wait().await;
            session.handler.abort();
            info!("Browser shutdown complete");
        }
    }
}

impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        // The Browser kills its child process when dropped; the handler task
        // would otherwise outlive it.
        if let Some(session) = self.session.get_mut().take() {
            session.handler.abort();
        }
    }
}
