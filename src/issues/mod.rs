//! SEO and technical issue detection.
//!
//! Per-page rules run right after a record is appended; the cross-page
//! duplicate-content pass (see [`duplication`]) runs once at crawl
//! completion. URLs whose path matches an exclusion pattern produce no
//! issues at all.

pub mod duplication;

use parking_lot::Mutex;
use regex::Regex;
use url::Url;

use crate::page_extractor::schema::{IssueRecord, IssueSeverity, PageRecord};

const TITLE_MAX: usize = 60;
const TITLE_MIN: usize = 30;
const META_DESC_MAX: usize = 160;
const META_DESC_MIN: usize = 120;
const THIN_CONTENT_WORDS: usize = 300;
const SLOW_RESPONSE_MS: u64 = 3000;
const MODERATE_RESPONSE_MS: u64 = 1000;
const LARGE_PAGE_BYTES: u64 = 3 * 1024 * 1024;
const MODERATE_PAGE_BYTES: u64 = 1024 * 1024;

/// One compiled path-exclusion pattern.
enum ExclusionPattern {
    /// Pattern contained `*`: matched as an anchored glob over the path.
    Glob(Regex),
    /// Plain pattern: path prefix match (equality is a prefix of itself).
    Prefix(String),
}

/// Detects quality issues in crawled pages.
pub struct IssueDetector {
    exclusions: Vec<ExclusionPattern>,
    issues: Mutex<Vec<IssueRecord>>,
}

impl IssueDetector {
    /// Build a detector from an exclusion list. Empty lines and `#`
    /// comments are skipped; patterns that fail to compile are dropped.
    #[must_use]
    pub fn new(exclusion_patterns: &[String]) -> Self {
        let exclusions = exclusion_patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty() && !p.starts_with('#'))
            .filter_map(|p| {
                if p.contains('*') {
                    glob_to_regex(p).map(ExclusionPattern::Glob)
                } else {
                    Some(ExclusionPattern::Prefix(p.to_string()))
                }
            })
            .collect();

        Self {
            exclusions,
            issues: Mutex::new(Vec::new()),
        }
    }

    /// Run every per-page rule against a record. Returns the newly raised
    /// issues (also retained internally).
    pub fn detect(&self, record: &PageRecord) -> Vec<IssueRecord> {
        if self.should_exclude(&record.url) {
            return Vec::new();
        }

        let mut issues = Vec::new();
        check_title(record, &mut issues);
        check_meta_description(record, &mut issues);
        check_headings(record, &mut issues);
        check_content(record, &mut issues);
        check_technical(record, &mut issues);
        check_mobile(record, &mut issues);
        check_accessibility(record, &mut issues);
        check_social(record, &mut issues);
        check_structured_data(record, &mut issues);
        check_performance(record, &mut issues);
        check_indexability(record, &mut issues);

        self.issues.lock().extend(issues.iter().cloned());
        issues
    }

    /// All issues raised so far, as a copy.
    #[must_use]
    pub fn issues(&self) -> Vec<IssueRecord> {
        self.issues.lock().clone()
    }

    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issues.lock().len()
    }

    /// Reload previously persisted issues on resume.
    pub fn restore(&self, issues: Vec<IssueRecord>) {
        *self.issues.lock() = issues;
    }

    pub(crate) fn push_all(&self, issues: Vec<IssueRecord>) {
        self.issues.lock().extend(issues);
    }

    /// Whether a URL's path matches any exclusion pattern.
    #[must_use]
    pub fn should_exclude(&self, url: &str) -> bool {
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());

        self.exclusions.iter().any(|pattern| match pattern {
            ExclusionPattern::Glob(re) => re.is_match(&path),
            ExclusionPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        })
    }
}

fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(&ch.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

fn issue(
    record: &PageRecord,
    severity: IssueSeverity,
    category: &str,
    name: &str,
    details: String,
) -> IssueRecord {
    IssueRecord {
        url: record.url.clone(),
        severity,
        category: category.to_string(),
        issue: name.to_string(),
        details,
    }
}

fn check_title(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    let len = record.title.chars().count();
    if record.title.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "SEO",
            "Missing Title Tag",
            "Page has no title tag".to_string(),
        ));
    } else if len > TITLE_MAX {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "SEO",
            "Title Too Long",
            format!("Title is {len} characters (recommended: ≤{TITLE_MAX})"),
        ));
    } else if len < TITLE_MIN {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "SEO",
            "Title Too Short",
            format!("Title is {len} characters (recommended: {TITLE_MIN}-{TITLE_MAX})"),
        ));
    }
}

fn check_meta_description(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    let len = record.meta_description.chars().count();
    if record.meta_description.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "SEO",
            "Missing Meta Description",
            "Page has no meta description".to_string(),
        ));
    } else if len > META_DESC_MAX {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "SEO",
            "Meta Description Too Long",
            format!("Description is {len} characters (recommended: ≤{META_DESC_MAX})"),
        ));
    } else if len < META_DESC_MIN {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "SEO",
            "Meta Description Too Short",
            format!("Description is {len} characters (recommended: {META_DESC_MIN}-{META_DESC_MAX})"),
        ));
    }
}

fn check_headings(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    if record.h1.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "SEO",
            "Missing H1 Tag",
            "Page has no H1 heading".to_string(),
        ));
    }
}

fn check_content(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    if record.word_count < THIN_CONTENT_WORDS {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Content",
            "Thin Content",
            format!(
                "Page has only {} words (recommended: ≥{THIN_CONTENT_WORDS})",
                record.word_count
            ),
        ));
    }
}

fn check_technical(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    let status = record.status_code;
    if (400..500).contains(&status) {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Technical",
            &format!("{status} Client Error"),
            status_code_message(status).to_string(),
        ));
    } else if status >= 500 {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Technical",
            &format!("{status} Server Error"),
            status_code_message(status).to_string(),
        ));
    } else if (300..400).contains(&status) {
        issues.push(issue(
            record,
            IssueSeverity::Info,
            "Technical",
            &format!("{status} Redirect"),
            "URL redirects to another location".to_string(),
        ));
    }

    if record.canonical_url.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Technical",
            "Missing Canonical URL",
            "Page has no canonical URL specified".to_string(),
        ));
    } else if record.canonical_url != record.url {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Technical",
            "Canonical URL Different",
            format!("Canonical points to: {}", record.canonical_url),
        ));
    }
}

fn check_mobile(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    if record.viewport.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Mobile",
            "Missing Viewport Meta Tag",
            "Page is not mobile-optimized".to_string(),
        ));
    }
}

fn check_accessibility(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    if record.lang.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Accessibility",
            "Missing Language Attribute",
            "HTML tag has no lang attribute".to_string(),
        ));
    }

    let without_alt = record.images.iter().filter(|img| img.alt.is_empty()).count();
    if without_alt > 0 {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Accessibility",
            "Images Without Alt Text",
            format!(
                "{without_alt} of {} images lack alt text",
                record.images.len()
            ),
        ));
    }
}

fn check_social(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    if record.og_tags.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Social",
            "Missing OpenGraph Tags",
            "Page has no OpenGraph tags for social sharing".to_string(),
        ));
    }
    if record.twitter_tags.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Social",
            "Missing Twitter Card Tags",
            "Page has no Twitter Card tags".to_string(),
        ));
    }
}

fn check_structured_data(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    if record.json_ld.is_empty() && record.schema_org.is_empty() {
        issues.push(issue(
            record,
            IssueSeverity::Info,
            "Structured Data",
            "No Structured Data",
            "Page has no JSON-LD or Schema.org markup".to_string(),
        ));
    }
}

fn check_performance(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    let rt = record.response_time_ms;
    // Browser-rendered timings include the scripted wait, so they are not
    // comparable against plain HTTP thresholds.
    if !record.javascript_rendered && rt > SLOW_RESPONSE_MS {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Performance",
            "Slow Response Time",
            format!("Page took {rt}ms to respond (recommended: <{SLOW_RESPONSE_MS}ms)"),
        ));
    } else if !record.javascript_rendered && rt > MODERATE_RESPONSE_MS {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Performance",
            "Moderate Response Time",
            format!("Page took {rt}ms to respond (recommended: <{MODERATE_RESPONSE_MS}ms)"),
        ));
    }

    let mb = record.size as f64 / 1024.0 / 1024.0;
    if record.size > LARGE_PAGE_BYTES {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Performance",
            "Large Page Size",
            format!("Page size is {mb:.1}MB (recommended: <3MB)"),
        ));
    } else if record.size > MODERATE_PAGE_BYTES {
        issues.push(issue(
            record,
            IssueSeverity::Warning,
            "Performance",
            "Moderate Page Size",
            format!("Page size is {mb:.1}MB (recommended: <1MB)"),
        ));
    }
}

fn check_indexability(record: &PageRecord, issues: &mut Vec<IssueRecord>) {
    let robots = record.robots.to_lowercase();
    if robots.contains("noindex") {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Indexability",
            "Noindex Tag Present",
            "Page is BLOCKED from search engines - has noindex directive".to_string(),
        ));
    }
    if robots.contains("nofollow") {
        issues.push(issue(
            record,
            IssueSeverity::Error,
            "Indexability",
            "Nofollow Tag Present",
            "Links on this page are NOT followed by search engines - has nofollow directive"
                .to_string(),
        ));
    }
}

const fn status_code_message(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        410 => "Gone",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "HTTP Error",
    }
}
