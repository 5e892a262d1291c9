//! Lightweight fetch strategy
//!
//! Direct HTTP(S) GET with:
//! - manual redirects (capped), re-checking the attachment heuristic per hop
//! - header guards before the body is read
//! - a streamed byte ceiling
//! - exponential-backoff retries for transport failures, 429 and 5xx
//! - an overall deadline so a stalled socket cannot hang the run

use crate::config::FetchConfig;
use crate::crawler::fetcher::{guard_headers, guard_url, FetchStrategy, FetchedPage, Fetcher};
use crate::crawler::scheduler::ExponentialBackoff;
use crate::{DarkwatchError, FetchError};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect::Policy, Client, Proxy, Response};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client; [`HttpFetcher`] walks them
/// itself so every hop passes the attachment guard. When `use-proxy` is set
/// all traffic goes through `socks5h://` so hostnames (including `.onion`)
/// are resolved by the proxy.
///
/// # Arguments
///
/// * `config` - The fetch configuration
/// * `proxy` - SOCKS endpoint (`host:port`), if any
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client or proxy
pub fn build_http_client(config: &FetchConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true);

    if let Some(endpoint) = proxy {
        builder = builder.proxy(Proxy::all(format!("socks5h://{}", endpoint))?);
    }

    builder.build()
}

fn retry_backoff(config: &FetchConfig) -> ExponentialBackoff {
    ExponentialBackoff::new(config.backoff_base_ms, config.backoff_base_ms.saturating_mul(8))
}

/// Upper bound on one lightweight fetch including every retry
///
/// Each attempt may use the full request timeout, and every retry but the
/// last is preceded by the longest backoff it can draw.
pub fn retry_deadline(config: &FetchConfig) -> Duration {
    let attempts = config.max_retries.max(1);
    let backoff = retry_backoff(config);
    let requests = Duration::from_secs(config.timeout_secs).saturating_mul(attempts);
    (0..attempts - 1)
        .map(|attempt| backoff.upper_bound(attempt))
        .fold(requests, Duration::saturating_add)
}

/// Lightweight strategy implementation
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
    max_redirects: u32,
    max_attempts: u32,
    backoff: ExponentialBackoff,
    deadline: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher from configuration, wiring the proxy if enabled
    pub fn new(config: &FetchConfig) -> Result<Self, DarkwatchError> {
        let proxy = config
            .use_proxy
            .then_some(config.lightweight_proxy.as_str());
        let client = build_http_client(config, proxy)?;

        let max_attempts = config.max_retries.max(1);
        let backoff = retry_backoff(config);
        Ok(Self {
            client,
            max_bytes: config.max_html_bytes,
            max_redirects: config.max_redirects,
            max_attempts,
            backoff,
            deadline: retry_deadline(config),
        })
    }

    /// Runs the redirect walk with bounded retries for transient failures
    async fn fetch_with_retries(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(
                        url = %url,
                        attempt = attempt + 1,
                        "Retryable fetch failure ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass through the redirect chain
    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut current = url.clone();

        for _ in 0..=self.max_redirects {
            guard_url(&current)?;

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| transport(&current, e))?;

            let status = response.status();
            if status.is_redirection() {
                current = redirect_target(&current, &response)?;
                tracing::debug!("Redirected to {}", current);
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }

            guard_headers(&current, response.headers(), self.max_bytes)?;
            let body = self.read_capped(&current, response).await?;

            return Ok(FetchedPage {
                final_url: current,
                html: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Err(FetchError::TooManyRedirects {
            url: url.to_string(),
        })
    }

    /// Streams the body, aborting as soon as the ceiling is crossed
    async fn read_capped(&self, url: &Url, mut response: Response) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| transport(url, e))? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::UnsafeResponse {
                    url: url.to_string(),
                    reason: format!("streamed body exceeds {} bytes", self.max_bytes),
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Lightweight
    }

    async fn fetch_html(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        // Fail fast, before the deadline timer or any socket exists
        guard_url(url)?;

        tokio::time::timeout(self.deadline, self.fetch_with_retries(url))
            .await
            .map_err(|_| FetchError::DeadlineExceeded {
                url: url.to_string(),
            })?
    }
}

fn transport(url: &Url, error: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        message: error.to_string(),
    }
}

fn redirect_target(current: &Url, response: &Response) -> Result<Url, FetchError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| FetchError::UnsafeResponse {
            url: current.to_string(),
            reason: format!("redirect {} without Location", response.status().as_u16()),
        })?;

    current.join(location).map_err(|e| FetchError::UnsafeResponse {
        url: current.to_string(),
        reason: format!("bad redirect target '{}': {}", location, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&FetchConfig::default(), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_retry_deadline_leaves_room_for_every_attempt() {
        let config = FetchConfig {
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 1200,
            ..FetchConfig::default()
        };
        // 3 x 30s requests, then 1320ms and 2640ms of worst-case backoff
        assert_eq!(retry_deadline(&config), Duration::from_millis(93_960));

        let single = FetchConfig {
            max_retries: 1,
            ..config
        };
        assert_eq!(retry_deadline(&single), Duration::from_secs(30));
    }

    #[test]
    fn test_build_http_client_with_socks() {
        let client = build_http_client(&FetchConfig::default(), Some("127.0.0.1:9150"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_fetcher_reports_strategy() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        assert_eq!(fetcher.strategy(), FetchStrategy::Lightweight);
        assert_eq!(fetcher.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_blocked_url_fails_without_network() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        // Unroutable host: a request attempt would be a transport error instead
        let url = Url::parse("http://unreachable.invalid/files/tool.exe").unwrap();
        let err = fetcher.fetch_html(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::BlockedUrl { .. }));
    }
}
