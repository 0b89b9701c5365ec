//! HTTP fetch path.
//!
//! Per URL: optional HEAD size gate, then GET with linear-backoff retries
//! and manual redirect following so the full chain lands in the record.
//! The client embeds the crawl's HTTP profile (user agent, accept-language,
//! custom headers, cookies, proxy, timeout) and is rebuilt atomically when
//! the configuration changes; in-flight requests keep the old client.

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use std::time::Duration;
use url::Url;

use crate::config::CrawlConfig;
use crate::crawl_engine::crawl_types::CrawlError;

/// Redirect hop cap when following manually.
const MAX_REDIRECT_HOPS: usize = 10;
/// Linear backoff between retry attempts.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Raw fetch result handed to the extractor.
#[derive(Debug)]
pub struct FetchedPage {
    pub status_code: u16,
    /// Content type with any `; charset=...` parameters stripped.
    pub content_type: String,
    pub body: String,
    pub size: u64,
    /// URLs visited before the final response, in hop order.
    pub redirects: Vec<String>,
    pub is_html: bool,
}

/// HTTP fetcher shared by all workers of one crawl.
pub struct HttpFetcher {
    client: RwLock<reqwest::Client>,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            client: RwLock::new(build_client(config)?),
        })
    }

    /// Swap in a client reflecting updated configuration.
    pub fn rebuild(&self, config: &CrawlConfig) -> Result<(), CrawlError> {
        let client = build_client(config)?;
        *self.client.write() = client;
        Ok(())
    }

    /// A plain client with the same profile, for robots/sitemap fetches.
    #[must_use]
    pub fn client(&self) -> reqwest::Client {
        self.client.read().clone()
    }

    /// Fetch one URL. `Err` carries the failure detail for a status-0
    /// record; the crawl itself continues either way.
    pub async fn fetch(&self, url: &str, config: &CrawlConfig) -> Result<FetchedPage, String> {
        let client = self.client();

        if config.max_file_size > 0
            && let Some(length) = self.head_content_length(&client, url, config).await
            && length > config.max_file_size
        {
            return Err(format!("File too large: {length} bytes"));
        }

        let mut last_error = String::new();
        for attempt in 0..=config.retries {
            match get_following_redirects(&client, url, config).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    last_error = e.to_string();
                    log::debug!(
                        "fetch attempt {}/{} failed for {url}: {last_error}",
                        attempt + 1,
                        config.retries + 1
                    );
                    if attempt < config.retries {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Advisory size check; any HEAD failure just skips the gate.
    async fn head_content_length(
        &self,
        client: &reqwest::Client,
        url: &str,
        config: &CrawlConfig,
    ) -> Option<u64> {
        let resp = client
            .head(url)
            .timeout(Duration::from_secs(config.timeout))
            .send()
            .await
            .ok()?;
        resp.headers()
            .get(CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }
}

async fn get_following_redirects(
    client: &reqwest::Client,
    url: &str,
    config: &CrawlConfig,
) -> anyhow::Result<FetchedPage> {
    let mut redirects = Vec::new();
    let mut current = url.to_string();

    loop {
        let resp = client.get(&current).send().await?;
        let status = resp.status();

        if status.is_redirection() && config.follow_redirects && redirects.len() < MAX_REDIRECT_HOPS
            && let Some(location) = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
        {
            let next = Url::parse(&current)?.join(location)?;
            redirects.push(current);
            current = next.to_string();
            continue;
        }

        let content_type_full = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let content_type = content_type_full
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let is_html = content_type_full.contains("text/html");

        let bytes = resp.bytes().await?;
        let size = bytes.len() as u64;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        return Ok(FetchedPage {
            status_code: status.as_u16(),
            content_type,
            body,
            size,
            redirects,
            is_html,
        });
    }
}

fn build_client(config: &CrawlConfig) -> Result<reqwest::Client, CrawlError> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }
    for (name, value) in &config.custom_headers {
        let Ok(name) = name.parse::<HeaderName>() else {
            return Err(CrawlError::Config(format!("invalid header name {name:?}")));
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            return Err(CrawlError::Config(format!(
                "invalid value for header {name:?}"
            )));
        };
        headers.insert(name, value);
    }

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout))
        // Redirects are followed manually so the chain can be recorded.
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(config.allow_cookies);

    if config.enable_proxy
        && let Some(proxy_url) = config.proxy_url.as_deref()
    {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| CrawlError::Config(format!("invalid proxy_url: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| CrawlError::Config(format!("failed to build HTTP client: {e}")))
}
