//! Per-host robots.txt cache.
//!
//! The first decision for a host fetches its robots.txt with the crawl's
//! HTTP profile; the body is cached for the lifetime of the crawl. Fetch
//! failures and non-2xx responses cache an empty body, which means
//! default-allow.

use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Robots.txt bodies keyed by `host[:port]`, one fetch per host per crawl.
pub struct RobotsCache {
    client: reqwest::Client,
    bodies: DashMap<String, Arc<String>>,
}

impl RobotsCache {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            bodies: DashMap::new(),
        }
    }

    /// Whether `user_agent` may fetch `url` according to the target host's
    /// robots.txt. Unparseable URLs and missing robots files are allowed.
    pub async fn can_fetch(&self, user_agent: &str, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(body) = self.body_for(&parsed).await else {
            return true;
        };
        if body.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&body, user_agent, url)
    }

    /// `Sitemap:` directives from the host's robots.txt, in file order.
    pub async fn sitemap_directives(&self, base_url: &Url) -> Vec<String> {
        let Some(body) = self.body_for(base_url).await else {
            return Vec::new();
        };

        body.lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                if !key.trim().eq_ignore_ascii_case("sitemap") {
                    return None;
                }
                let value = value.trim();
                if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            })
            .collect()
    }

    async fn body_for(&self, url: &Url) -> Option<Arc<String>> {
        let host = url.host_str()?;
        let key = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        if let Some(cached) = self.bodies.get(&key) {
            return Some(cached.clone());
        }

        let robots_url = format!("{}://{key}/robots.txt", url.scheme());
        let body = match self
            .client
            .get(&robots_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            Ok(resp) => {
                log::debug!("robots.txt for {key} returned {}", resp.status());
                String::new()
            }
            Err(e) => {
                log::debug!("robots.txt fetch failed for {key}: {e}");
                String::new()
            }
        };

        let body = Arc::new(body);
        self.bodies.insert(key, body.clone());
        Some(body)
    }
}
