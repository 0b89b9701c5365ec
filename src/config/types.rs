//! Crawl configuration types.
//!
//! `CrawlConfig` is snapshotted by the orchestrator at crawl start; later
//! mutations through `apply_patch` take effect at enqueue/fetch boundaries
//! only. Include/exclude regexes are compiled once next to their sources so
//! the hot path never compiles patterns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Browser engine used for the JavaScript fetch path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

/// Full crawl engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Link-hop depth limit from the seed (seed is depth 0).
    pub max_depth: u8,
    /// Hard budget of URL records per crawl.
    pub max_urls: usize,
    /// Seconds between request starts; 0 disables the rate gate.
    pub delay: f64,
    pub follow_redirects: bool,
    pub crawl_external: bool,
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Retries on transient fetch errors, with 1s linear backoff.
    pub retries: u32,
    pub accept_language: String,
    pub respect_robots: bool,
    pub allow_cookies: bool,
    pub include_extensions: Vec<String>,
    pub exclude_extensions: Vec<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Skip bodies larger than this many bytes (HEAD gate); 0 disables.
    pub max_file_size: u64,
    /// HTTP worker pool size.
    pub concurrency: usize,
    /// Soft memory budget in bytes, reported against in the snapshot.
    pub memory_limit: u64,
    pub enable_proxy: bool,
    pub proxy_url: Option<String>,
    pub custom_headers: BTreeMap<String, String>,
    pub discover_sitemaps: bool,
    pub enable_pagespeed: bool,
    pub google_api_key: Option<String>,
    pub enable_javascript: bool,
    /// Seconds to wait after navigation for scripts to settle.
    pub js_wait_time: u64,
    /// Navigation timeout in seconds for the browser path.
    pub js_timeout: u64,
    pub js_browser: BrowserEngine,
    pub js_headless: bool,
    pub js_user_agent: String,
    pub js_viewport_width: u32,
    pub js_viewport_height: u32,
    /// Browser page pool size; also the browser-path worker count.
    pub js_max_concurrent_pages: usize,
    /// Glob list excluding paths from issue detection; `#` lines are comments.
    pub issue_exclusion_patterns: Vec<String>,
    pub enable_duplication_check: bool,
    pub duplication_threshold: f64,
    /// Sqlite file backing persistence and resume; `None` disables both.
    pub persist_db_path: Option<PathBuf>,

    /// Compiled from `include_patterns` by `compile_patterns`.
    #[serde(skip)]
    pub include_patterns_compiled: Vec<regex::Regex>,
    /// Compiled from `exclude_patterns` by `compile_patterns`.
    #[serde(skip)]
    pub exclude_patterns_compiled: Vec<regex::Regex>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_urls: 1000,
            delay: 1.0,
            follow_redirects: true,
            crawl_external: false,
            user_agent: "Crawlscope/0.1 (SEO Crawler)".to_string(),
            timeout: 10,
            retries: 3,
            accept_language: "en-US,en;q=0.9".to_string(),
            respect_robots: true,
            allow_cookies: true,
            include_extensions: ["html", "htm", "php", "asp", "aspx", "jsp"]
                .map(String::from)
                .to_vec(),
            exclude_extensions: ["pdf", "doc", "docx", "zip", "exe", "dmg"]
                .map(String::from)
                .to_vec(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_file_size: 50 * 1024 * 1024,
            concurrency: 5,
            memory_limit: 512 * 1024 * 1024,
            enable_proxy: false,
            proxy_url: None,
            custom_headers: BTreeMap::new(),
            discover_sitemaps: true,
            enable_pagespeed: false,
            google_api_key: None,
            enable_javascript: false,
            js_wait_time: 3,
            js_timeout: 30,
            js_browser: BrowserEngine::Chromium,
            js_headless: true,
            js_user_agent: "Crawlscope/0.1 (SEO Crawler; JavaScript)".to_string(),
            js_viewport_width: 1920,
            js_viewport_height: 1080,
            js_max_concurrent_pages: 3,
            issue_exclusion_patterns: default_issue_exclusions(),
            enable_duplication_check: true,
            duplication_threshold: 0.85,
            persist_db_path: None,
            include_patterns_compiled: Vec::new(),
            exclude_patterns_compiled: Vec::new(),
        }
    }
}

/// Paths that generate noise rather than signal in an SEO audit: CMS
/// internals, auth flows, carts, build artifacts and machine-readable files.
fn default_issue_exclusions() -> Vec<String> {
    [
        "# CMS admin & system paths",
        "/wp-admin/*",
        "/wp-content/plugins/*",
        "/wp-content/themes/*",
        "/wp-content/uploads/*",
        "/wp-includes/*",
        "/wp-login.php",
        "/wp-cron.php",
        "/xmlrpc.php",
        "/wp-json/*",
        "# Auth & user management",
        "/login*",
        "/signin*",
        "/sign-in*",
        "/auth/*",
        "/register*",
        "/signup*",
        "/sign-up*",
        "/logout*",
        "/signout*",
        "/forgot-password*",
        "/reset-password*",
        "/password-reset*",
        "/verify/*",
        "/confirm/*",
        "# Admin panels & dashboards",
        "/admin/*",
        "/administrator/*",
        "/backend/*",
        "/dashboard/*",
        "/cpanel/*",
        "/phpmyadmin/*",
        "/manage/*",
        "# E-commerce checkout & cart",
        "/checkout/*",
        "/cart/*",
        "/basket/*",
        "/payment/*",
        "/billing/*",
        "/order/*",
        "/orders/*",
        "# User account pages",
        "/account/*",
        "/profile/*",
        "/settings/*",
        "/my-account/*",
        "/user/*",
        "/member/*",
        "# Server scripts, VCS & config",
        "/cgi-bin/*",
        "/.git/*",
        "/.svn/*",
        "/.env",
        "/.env.*",
        "/.htaccess",
        "# Build artifacts & internals",
        "/node_modules/*",
        "/vendor/*",
        "/dist/*",
        "/build/*",
        "/_next/*",
        "/.next/*",
        "/_nuxt/*",
        "/test/*",
        "/tests/*",
        "/debug/*",
        "/staging/*",
        "/api/internal/*",
        "/api/admin/*",
        "/private/*",
        "/internal/*",
        "/tmp/*",
        "/cache/*",
        "/logs/*",
        "/backup/*",
        "/backups/*",
        "/upload/*",
        "/uploads/*",
        "# Search, filters & special views",
        "/search*",
        "*/search/*",
        "*/filter/*",
        "*/sort/*",
        "/print/*",
        "/preview/*",
        "/embed/*",
        "/amp/*",
        "/amp",
        "# Feeds & machine-readable files",
        "/feed/*",
        "/feeds/*",
        "/rss/*",
        "*.rss",
        "/atom/*",
        "*.atom",
        "*.json",
        "*.xml",
        "*.yaml",
        "*.yml",
        "*.toml",
        "*.ini",
        "*.log",
        "*.txt",
        "*.csv",
        "*.sql",
        "*.bak",
        "*.old",
        "*.tmp",
        "*.map",
        "*.min.js",
        "*.min.css",
    ]
    .map(String::from)
    .to_vec()
}
