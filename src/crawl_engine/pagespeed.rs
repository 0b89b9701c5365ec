//! PageSpeed Insights side calls.
//!
//! An external analysis pass the orchestrator runs after the queue drains.
//! Rate-limit responses back off exponentially with jitter; other failures
//! are recorded on the affected sub-result and the pass continues.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::page_extractor::schema::PageRecord;

const API_URL: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
const API_TIMEOUT: Duration = Duration::from_secs(60);
/// Pages analyzed per crawl: the homepage plus up to two section pages.
const MAX_SECTION_PAGES: usize = 2;

/// Result of analyzing one URL for one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpeedOutcome {
    pub success: bool,
    pub strategy: String,
    pub performance_score: Option<u32>,
    /// Core web vital figures keyed by metric name, in seconds except CLS.
    pub metrics: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl PageSpeedOutcome {
    fn failure(strategy: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            strategy: strategy.to_string(),
            performance_score: None,
            metrics: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

/// Mobile and desktop outcomes for one analyzed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpeedSummary {
    pub url: String,
    pub mobile: PageSpeedOutcome,
    pub desktop: PageSpeedOutcome,
    pub analyzed_at: DateTime<Utc>,
}

/// Pick the homepage (shortest internal 200 path) and up to two top-level
/// section pages for analysis.
#[must_use]
pub fn select_pages(results: &[PageRecord]) -> Vec<String> {
    let ok_pages = || {
        results
            .iter()
            .filter(|r| r.status_code == 200 && r.is_internal)
    };

    let mut homepage: Option<(usize, String)> = None;
    for record in ok_pages() {
        let Ok(parsed) = Url::parse(&record.url) else {
            continue;
        };
        let path = parsed.path().trim_end_matches('/').to_string();
        if path.is_empty() {
            homepage = Some((0, record.url.clone()));
            break;
        }
        if homepage.as_ref().is_none_or(|(len, _)| path.len() < *len) {
            homepage = Some((path.len(), record.url.clone()));
        }
    }

    let mut selected = Vec::new();
    let homepage_url = homepage.map(|(_, url)| url);
    if let Some(url) = &homepage_url {
        selected.push(url.clone());
    }

    for record in ok_pages() {
        if selected.len() >= 1 + MAX_SECTION_PAGES {
            break;
        }
        let Ok(parsed) = Url::parse(&record.url) else {
            continue;
        };
        let path = parsed.path().trim_matches('/');
        if !path.is_empty()
            && !path.contains('/')
            && homepage_url.as_deref() != Some(record.url.as_str())
        {
            selected.push(record.url.clone());
        }
    }

    selected
}

/// Query the PageSpeed API for one URL and strategy.
pub async fn analyze(
    client: &reqwest::Client,
    url: &str,
    strategy: &str,
    api_key: Option<&str>,
    retries: u32,
) -> PageSpeedOutcome {
    let mut params = vec![
        ("url", url.to_string()),
        ("strategy", strategy.to_string()),
        ("category", "performance".to_string()),
    ];
    if let Some(key) = api_key {
        params.push(("key", key.to_string()));
    }

    for attempt in 0..=retries {
        let response = client
            .get(API_URL)
            .query(&params)
            .timeout(API_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 200 => {
                return match resp.json::<serde_json::Value>().await {
                    Ok(data) => parse_outcome(&data, strategy),
                    Err(e) => PageSpeedOutcome::failure(strategy, format!("invalid response: {e}")),
                };
            }
            Ok(resp) if resp.status().as_u16() == 429 && attempt < retries => {
                let jitter: f64 = rand::rng().random_range(0.5..1.5);
                let delay = Duration::from_secs_f64(f64::from(1u32 << attempt) * jitter);
                log::debug!("PageSpeed rate limited, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            Ok(resp) => {
                return PageSpeedOutcome::failure(
                    strategy,
                    format!("API returned status {}", resp.status()),
                );
            }
            Err(e) if attempt < retries => {
                log::debug!("PageSpeed request error, retrying: {e}");
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            Err(e) => {
                return PageSpeedOutcome::failure(strategy, format!("Network error: {e}"));
            }
        }
    }

    PageSpeedOutcome::failure(strategy, "retries exhausted")
}

fn parse_outcome(data: &serde_json::Value, strategy: &str) -> PageSpeedOutcome {
    let lighthouse = &data["lighthouseResult"];
    let audits = &lighthouse["audits"];

    let performance_score = lighthouse["categories"]["performance"]["score"]
        .as_f64()
        .map(|score| (score * 100.0).round() as u32);

    let mut metrics = BTreeMap::new();
    let numeric = |name: &str| audits[name]["numericValue"].as_f64();

    if let Some(fcp) = numeric("first-contentful-paint") {
        metrics.insert("first_contentful_paint".to_string(), round2(fcp / 1000.0));
    }
    if let Some(lcp) = numeric("largest-contentful-paint") {
        metrics.insert("largest_contentful_paint".to_string(), round2(lcp / 1000.0));
    }
    if let Some(cls) = numeric("cumulative-layout-shift") {
        metrics.insert("cumulative_layout_shift".to_string(), (cls * 1000.0).round() / 1000.0);
    }
    if let Some(si) = numeric("speed-index") {
        metrics.insert("speed_index".to_string(), round2(si / 1000.0));
    }
    if let Some(tti) = numeric("interactive") {
        metrics.insert("time_to_interactive".to_string(), round2(tti / 1000.0));
    }

    PageSpeedOutcome {
        success: true,
        strategy: strategy.to_string(),
        performance_score,
        metrics,
        error: None,
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, status: u16) -> PageRecord {
        PageRecord {
            url: url.to_string(),
            status_code: status,
            is_internal: true,
            ..PageRecord::default()
        }
    }

    #[test]
    fn selects_homepage_and_sections() {
        let results = vec![
            page("https://example.com/blog/post-1", 200),
            page("https://example.com/", 200),
            page("https://example.com/products", 200),
            page("https://example.com/about", 200),
        ];
        let selected = select_pages(&results);
        assert_eq!(selected[0], "https://example.com/");
        assert_eq!(selected.len(), 3);
        assert!(selected.contains(&"https://example.com/products".to_string()));
    }

    #[test]
    fn skips_error_pages() {
        let results = vec![page("https://example.com/", 500)];
        assert!(select_pages(&results).is_empty());
    }
}
