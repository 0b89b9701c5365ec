//! Record types produced by a crawl.
//!
//! A [`PageRecord`] is created exactly once per fetched URL (success or
//! well-formed failure) and is immutable once appended to the results list,
//! except for the `linked_from` backfill that runs at completion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Analytics and tracking integrations detected on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsTags {
    pub google_analytics: bool,
    pub gtag: bool,
    pub google_tag_manager: bool,
    pub facebook_pixel: bool,
    pub hotjar: bool,
    pub mixpanel: bool,
    pub ga4_id: String,
    pub gtm_id: String,
}

/// An image reference with its (possibly empty) alt text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

/// A `<link rel="alternate" hreflang="...">` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HreflangEntry {
    pub lang: String,
    pub href: String,
}

/// Everything extracted from a single crawled URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub status_code: u16,
    pub content_type: String,
    pub size: u64,
    pub is_internal: bool,
    pub depth: u8,
    pub title: String,
    pub meta_description: String,
    pub h1: String,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub word_count: usize,
    pub meta_tags: BTreeMap<String, String>,
    pub og_tags: BTreeMap<String, String>,
    pub twitter_tags: BTreeMap<String, String>,
    pub canonical_url: String,
    pub lang: String,
    pub charset: String,
    pub viewport: String,
    pub robots: String,
    pub author: String,
    pub keywords: String,
    pub generator: String,
    pub theme_color: String,
    pub json_ld: Vec<serde_json::Value>,
    pub analytics: AnalyticsTags,
    pub images: Vec<ImageRef>,
    pub external_links: usize,
    pub internal_links: usize,
    pub response_time_ms: u64,
    pub redirects: Vec<String>,
    pub hreflang: Vec<HreflangEntry>,
    pub schema_org: Vec<String>,
    pub linked_from: Vec<String>,
    pub javascript_rendered: bool,
    /// Failure detail for status-0 records (network errors, oversize skips).
    pub fetch_error: Option<String>,
}

impl PageRecord {
    /// A record for a URL whose fetch failed in a well-formed way.
    #[must_use]
    pub fn failed(url: &str, depth: u8, status_code: u16, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status_code,
            depth,
            fetch_error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Where in the document an anchor was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPlacement {
    Head,
    #[default]
    Body,
    Nav,
    Footer,
}

impl LinkPlacement {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Body => "body",
            Self::Nav => "nav",
            Self::Footer => "footer",
        }
    }
}

impl fmt::Display for LinkPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single edge in the link graph. Identity is the
/// `(source_url, target_url)` pair; duplicates are collapsed on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source_url: String,
    pub target_url: String,
    pub anchor_text: String,
    pub is_internal: bool,
    pub target_domain: String,
    /// Status of the target, backfilled once the target has been crawled.
    pub target_status: Option<u16>,
    pub placement: LinkPlacement,
}

/// Issue severity, ordered from most to least serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

impl IssueSeverity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected quality issue. Multiple rules may fire for one URL, so issue
/// rows are not deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub url: String,
    pub severity: IssueSeverity,
    pub category: String,
    pub issue: String,
    pub details: String,
}
