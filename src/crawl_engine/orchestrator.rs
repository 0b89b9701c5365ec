//! Crawl lifecycle orchestration.
//!
//! One orchestrator owns one crawl at a time: it normalizes the seed,
//! wires the per-crawl components together, runs the worker pool and walks
//! the lifecycle state machine
//! `idle → running → {paused ↔ running} → {completed | stopped | failed}`.
//!
//! Workers communicate only through the link manager, the results list and
//! the issue detector; pause and stop are cooperative flags re-checked at
//! the top of every worker iteration.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use url::Url;

use super::crawl_types::{CrawlError, CrawlStats, CrawlStatus, QueueEntry, StatusSnapshot};
use super::fetcher::{FetchedPage, HttpFetcher};
use super::link_manager::LinkManager;
use super::memory::MemoryMonitor;
use super::pagespeed::{self, PageSpeedSummary};
use super::rate_limiter::RateLimiter;
use super::robots::RobotsCache;
use super::sitemap::SitemapParser;
use crate::browser_pool::BrowserPagePool;
use crate::config::CrawlConfig;
use crate::issues::IssueDetector;
use crate::page_extractor;
use crate::page_extractor::schema::{IssueRecord, LinkRecord, PageRecord};
use crate::store::{CrawlStore, QueueCheckpoint};
use crate::utils::url_utils;

/// URL rows buffered before a size-triggered flush.
const URL_BATCH_SIZE: usize = 50;
/// Elapsed time that forces a flush regardless of batch size.
const AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(30);
/// Cadence of the background save timer.
const AUTO_SAVE_TICK: Duration = Duration::from_secs(5);
/// Pending entries kept in a checkpoint blob.
const CHECKPOINT_PENDING_LIMIT: usize = 1000;
/// Pause re-check granularity inside worker loops.
const PAUSE_POLL: Duration = Duration::from_secs(1);
/// Poll interval while the queue is empty but fetches are in flight.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Rows accumulated between store flushes. Links and issues piggyback on
/// the URL batch trigger.
struct UnsavedBatches {
    urls: Vec<PageRecord>,
    links: Vec<LinkRecord>,
    issues: Vec<IssueRecord>,
    last_save: Instant,
}

impl Default for UnsavedBatches {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            links: Vec::new(),
            issues: Vec::new(),
            last_save: Instant::now(),
        }
    }
}

/// Everything belonging to one crawl, shared between workers by `Arc`.
struct CrawlContext {
    crawl_id: Option<i64>,
    base_url: Url,
    config: RwLock<CrawlConfig>,
    status: Mutex<CrawlStatus>,
    running: AtomicBool,
    paused: AtomicBool,
    pagespeed_running: AtomicBool,
    /// Workers currently processing a dequeued URL.
    in_flight: AtomicUsize,
    /// Budget claims: records appended plus fetches in flight. Never
    /// exceeds `max_urls`, which is what keeps `crawled ≤ max_urls` exact.
    claimed: AtomicUsize,
    links: LinkManager,
    results: Mutex<Vec<PageRecord>>,
    detector: IssueDetector,
    limiter: RateLimiter,
    robots: RobotsCache,
    fetcher: HttpFetcher,
    sitemaps: SitemapParser,
    browser: Option<BrowserPagePool>,
    store: Option<CrawlStore>,
    unsaved: Mutex<UnsavedBatches>,
    stats: Mutex<CrawlStats>,
    memory: MemoryMonitor,
    pagespeed: Mutex<Vec<PageSpeedSummary>>,
}

impl CrawlContext {
    /// Transition to `next` unless a terminal state was already reached.
    fn set_status(&self, next: CrawlStatus) {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return;
        }
        *status = next;
    }
}

/// Public engine entry point: one crawl at a time per orchestrator.
pub struct CrawlOrchestrator {
    default_config: RwLock<CrawlConfig>,
    ctx: RwLock<Option<Arc<CrawlContext>>>,
    run_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for CrawlOrchestrator {
    fn default() -> Self {
        Self::new(CrawlConfig::default())
    }
}

impl CrawlOrchestrator {
    #[must_use]
    pub fn new(config: CrawlConfig) -> Self {
        Self {
            default_config: RwLock::new(config),
            ctx: RwLock::new(None),
            run_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Whether a crawl is in progress (paused counts as in progress).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active_ctx()
            .is_some_and(|ctx| ctx.running.load(Ordering::Acquire))
    }

    fn active_ctx(&self) -> Option<Arc<CrawlContext>> {
        self.ctx.read().clone()
    }

    /// Start crawling from a seed URL. Returns immediately; the crawl runs
    /// on background tasks.
    pub async fn start(
        &self,
        url: &str,
        user_id: Option<i64>,
        session_id: Option<&str>,
    ) -> Result<String, CrawlError> {
        if self.is_running() {
            return Err(CrawlError::AlreadyRunning);
        }

        let mut config = self.default_config.read().clone();
        config.validate()?;

        let seed = url_utils::normalize_url(url)
            .ok_or_else(|| CrawlError::InvalidSeed(url.to_string()))?;
        let seed_url =
            Url::parse(&seed).map_err(|e| CrawlError::InvalidSeed(format!("{url}: {e}")))?;
        let base_domain = url_utils::domain_of_parsed(&seed_url);
        if base_domain.is_empty() {
            return Err(CrawlError::InvalidSeed(url.to_string()));
        }
        let mut base_url = seed_url.clone();
        base_url.set_path("/");
        base_url.set_query(None);

        // A seed with a path means audit that one page, not the site.
        if !matches!(seed_url.path(), "" | "/") {
            log::info!(
                "seed has path {:?}, limiting crawl to a single page",
                seed_url.path()
            );
            config.max_depth = 0;
        }

        let store = match &config.persist_db_path {
            Some(path) => match CrawlStore::open(path).await {
                Ok(store) => Some(store),
                Err(e) => {
                    log::warn!("persistence unavailable, crawling in memory only: {e}");
                    None
                }
            },
            None => None,
        };

        let crawl_id = match &store {
            Some(store) => {
                let session = session_id.unwrap_or("default");
                match store
                    .create_crawl(user_id, session, base_url.as_str(), &base_domain, &config)
                    .await
                {
                    Ok(id) => {
                        log::info!("persistence enabled for crawl {id}");
                        Some(id)
                    }
                    Err(e) => {
                        log::warn!("could not create crawl record: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        let fetcher = HttpFetcher::new(&config)?;
        let client = fetcher.client();
        let limiter = RateLimiter::new(config.requests_per_second());
        let browser = config.enable_javascript.then(|| BrowserPagePool::new(&config));

        let ctx = Arc::new(CrawlContext {
            crawl_id,
            base_url,
            status: Mutex::new(CrawlStatus::Running),
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            pagespeed_running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            claimed: AtomicUsize::new(0),
            links: LinkManager::new(base_domain),
            results: Mutex::new(Vec::new()),
            detector: IssueDetector::new(&config.issue_exclusion_patterns),
            limiter,
            robots: RobotsCache::new(client.clone()),
            fetcher,
            sitemaps: SitemapParser::new(client),
            browser,
            store,
            unsaved: Mutex::new(UnsavedBatches::default()),
            stats: Mutex::new(CrawlStats {
                start_time: Some(Utc::now()),
                ..CrawlStats::default()
            }),
            memory: MemoryMonitor::new(),
            pagespeed: Mutex::new(Vec::new()),
            config: RwLock::new(config),
        });

        // A JS crawl without a browser is fatal; an HTTP crawl never is.
        if let Some(pool) = &ctx.browser
            && let Err(e) = pool.initialize().await
        {
            ctx.set_status(CrawlStatus::Failed);
            if let (Some(store), Some(id)) = (&ctx.store, ctx.crawl_id) {
                let _ = store.set_status(id, CrawlStatus::Failed).await;
            }
            *self.ctx.write() = Some(ctx);
            return Err(CrawlError::Browser(format!("{e:#}")));
        }

        ctx.links.add_url(&seed, 0);
        ctx.stats.lock().discovered = 1;

        *self.ctx.write() = Some(ctx.clone());
        let handle = tokio::spawn(run_crawl(ctx));
        *self.run_task.lock().await = Some(handle);

        Ok("Crawl started successfully".to_string())
    }

    /// Pause the crawl: set the flag, wait for in-flight fetches to finish
    /// their current page, then flush and checkpoint.
    pub async fn pause(&self) -> Result<String, CrawlError> {
        let ctx = self.active_ctx().ok_or(CrawlError::NotRunning)?;
        if !ctx.running.load(Ordering::Acquire) {
            return Err(CrawlError::NotRunning);
        }

        ctx.paused.store(true, Ordering::Release);
        while ctx.in_flight.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        flush_to_store(&ctx, true).await;
        save_checkpoint(&ctx).await;
        if let (Some(store), Some(id)) = (&ctx.store, ctx.crawl_id)
            && let Err(e) = store.set_status(id, CrawlStatus::Paused).await
        {
            log::warn!("could not persist paused status: {e}");
        }
        ctx.set_status(CrawlStatus::Paused);

        Ok("Crawl paused".to_string())
    }

    /// Clear the pause flag and let workers continue.
    pub async fn resume(&self) -> Result<String, CrawlError> {
        let ctx = self.active_ctx().ok_or(CrawlError::NotRunning)?;
        if !ctx.running.load(Ordering::Acquire) {
            return Err(CrawlError::NotRunning);
        }
        if !ctx.paused.load(Ordering::Acquire) {
            return Err(CrawlError::NotPaused);
        }

        ctx.paused.store(false, Ordering::Release);
        ctx.set_status(CrawlStatus::Running);
        if let (Some(store), Some(id)) = (&ctx.store, ctx.crawl_id)
            && let Err(e) = store.set_status(id, CrawlStatus::Running).await
        {
            log::warn!("could not persist running status: {e}");
        }

        Ok("Crawl resumed".to_string())
    }

    /// Cooperative stop: workers exit at their next flag check, state is
    /// flushed, the browser pool is torn down.
    pub async fn stop(&self) -> Result<String, CrawlError> {
        let ctx = self.active_ctx().ok_or(CrawlError::NotRunning)?;

        ctx.running.store(false, Ordering::Release);
        ctx.paused.store(false, Ordering::Release);
        ctx.pagespeed_running.store(false, Ordering::Release);

        if let Some(handle) = self.run_task.lock().await.take()
            && let Err(e) = handle.await
        {
            log::error!("crawl task failed during stop: {e}");
        }

        Ok("Crawl and PageSpeed analysis stopped".to_string())
    }

    /// Resume a previously persisted crawl from the configured store.
    pub async fn resume_from_store(
        &self,
        crawl_id: i64,
        user_id: Option<i64>,
    ) -> Result<String, CrawlError> {
        if self.is_running() {
            return Err(CrawlError::AlreadyRunning);
        }

        let db_path = self
            .default_config
            .read()
            .persist_db_path
            .clone()
            .ok_or_else(|| CrawlError::Store("persistence is not configured".to_string()))?;

        let store = CrawlStore::open(&db_path).await?;
        let header = store
            .crawl_header(crawl_id)
            .await?
            .ok_or_else(|| CrawlError::NotResumable("not found".to_string()))?;

        let status = CrawlStatus::from_str_lossy(&header.status);
        if !matches!(
            status,
            CrawlStatus::Paused | CrawlStatus::Failed | CrawlStatus::Running
        ) {
            return Err(CrawlError::NotResumable(header.status.clone()));
        }
        if let (Some(uid), Some(owner)) = (user_id, header.user_id)
            && uid != owner
        {
            return Err(CrawlError::Unauthorized);
        }

        let mut config = header
            .config_snapshot
            .clone()
            .unwrap_or_else(|| self.default_config.read().clone());
        config.compile_patterns()?;

        let base_url = Url::parse(&header.base_url)
            .map_err(|e| CrawlError::InvalidSeed(format!("{}: {e}", header.base_url)))?;

        let fetcher = HttpFetcher::new(&config)?;
        let client = fetcher.client();
        let limiter = RateLimiter::new(config.requests_per_second());
        let browser = config.enable_javascript.then(|| BrowserPagePool::new(&config));

        let ctx = Arc::new(CrawlContext {
            crawl_id: Some(crawl_id),
            base_url,
            status: Mutex::new(CrawlStatus::Running),
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            pagespeed_running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            claimed: AtomicUsize::new(0),
            links: LinkManager::new(header.base_domain.clone()),
            results: Mutex::new(Vec::new()),
            detector: IssueDetector::new(&config.issue_exclusion_patterns),
            limiter,
            robots: RobotsCache::new(client.clone()),
            fetcher,
            sitemaps: SitemapParser::new(client),
            browser,
            store: Some(store),
            unsaved: Mutex::new(UnsavedBatches::default()),
            stats: Mutex::new(CrawlStats::default()),
            memory: MemoryMonitor::new(),
            pagespeed: Mutex::new(Vec::new()),
            config: RwLock::new(config),
        });

        if let Some(pool) = &ctx.browser
            && let Err(e) = pool.initialize().await
        {
            ctx.set_status(CrawlStatus::Failed);
            *self.ctx.write() = Some(ctx);
            return Err(CrawlError::Browser(format!("{e:#}")));
        }

        let Some(store_ref) = ctx.store.as_ref() else {
            return Err(CrawlError::Store("store detached during resume".to_string()));
        };
        let records = store_ref.load_urls(crawl_id).await?;
        let links = store_ref.load_links(crawl_id).await?;
        let issues = store_ref.load_issues(crawl_id).await?;
        log::info!(
            "loaded {} URLs, {} links, {} issues for crawl {crawl_id}",
            records.len(),
            links.len(),
            issues.len()
        );

        ctx.links.seed_discovered(records.iter().map(|r| r.url.clone()));
        ctx.links.restore_links(links);
        ctx.detector.restore(issues);

        {
            let mut stats = ctx.stats.lock();
            stats.crawled = records.len();
            stats.discovered = (header.urls_discovered.max(0) as usize).max(records.len());
            stats.max_depth_reached = header.max_depth_reached.clamp(0, 255) as u8;
            stats.start_time = Some(Utc::now());
        }
        ctx.claimed.store(records.len(), Ordering::Release);

        // Visited must cover every crawled record, with or without a
        // checkpoint, or link extraction would re-discover crawled pages.
        let mut visited: Vec<String> = records.iter().map(|r| r.url.clone()).collect();
        let pending = match header.resume_checkpoint.clone() {
            Some(checkpoint) => {
                visited.extend(checkpoint.visited_urls);
                checkpoint.discovered_urls
            }
            None => Vec::new(),
        };
        ctx.links.restore_queue(pending, visited);
        *ctx.results.lock() = records;

        if ctx.links.stats().pending == 0 {
            rebuild_queue_from_links(&ctx);
        }

        if let Err(e) = store_ref.set_status(crawl_id, CrawlStatus::Running).await {
            log::warn!("could not persist running status: {e}");
        }

        let crawled = ctx.stats.lock().crawled;
        *self.ctx.write() = Some(ctx.clone());
        let handle = tokio::spawn(run_crawl(ctx));
        *self.run_task.lock().await = Some(handle);

        Ok(format!("Resumed crawl from {crawled} URLs"))
    }

    /// Owned snapshot of the crawl for API consumers.
    #[must_use]
    pub fn get_status(&self) -> StatusSnapshot {
        let Some(ctx) = self.active_ctx() else {
            return StatusSnapshot::idle();
        };

        let results = ctx.results.lock().clone();
        ctx.links.update_link_statuses(&results);

        let link_stats = ctx.links.stats();
        let stats = {
            let mut stats = ctx.stats.lock();
            stats.discovered = stats.discovered.max(link_stats.discovered);
            if let Some(start) = stats.start_time {
                let elapsed = (Utc::now() - start).num_milliseconds().max(1000) as f64 / 1000.0;
                stats.speed_rps = (stats.crawled as f64 / elapsed * 100.0).round() / 100.0;
            }
            stats.clone()
        };

        let links = ctx.links.links_snapshot();
        let issues = ctx.detector.issues();
        let memory = ctx.memory.update(&results, links.len(), issues.len());
        let progress_pct =
            (stats.crawled as f64 / stats.discovered.max(1) as f64 * 100.0).min(100.0);

        StatusSnapshot {
            status: *ctx.status.lock(),
            stats,
            urls: results,
            links,
            issues,
            progress_pct,
            is_running_pagespeed: ctx.pagespeed_running.load(Ordering::Acquire),
            memory,
            pagespeed: ctx.pagespeed.lock().clone(),
        }
    }

    /// Merge a JSON partial into the configuration. Takes effect at
    /// enqueue/fetch boundaries; in-flight requests are unaffected.
    pub fn update_config(&self, patch: &serde_json::Value) -> Result<(), CrawlError> {
        self.default_config.write().apply_patch(patch)?;

        if let Some(ctx) = self.active_ctx() {
            let mut config = ctx.config.write();
            config.apply_patch(patch)?;
            ctx.limiter.update_rate(config.requests_per_second());
            ctx.fetcher.rebuild(&config)?;
        }
        Ok(())
    }

    /// Copy of the effective configuration.
    #[must_use]
    pub fn config(&self) -> CrawlConfig {
        match self.active_ctx() {
            Some(ctx) => ctx.config.read().clone(),
            None => self.default_config.read().clone(),
        }
    }
}

// Run loop ---------------------------------------------------------------

async fn run_crawl(ctx: Arc<CrawlContext>) {
    if ctx.config.read().discover_sitemaps {
        discover_sitemap_urls(&ctx).await;
    }

    let saver = ctx
        .store
        .as_ref()
        .map(|_| tokio::spawn(auto_save_loop(ctx.clone())));

    let worker_count = {
        let config = ctx.config.read();
        if config.enable_javascript {
            config.js_max_concurrent_pages
        } else {
            config.concurrency
        }
    };

    let mut workers = Vec::with_capacity(worker_count);
    for slot in 0..worker_count {
        workers.push(tokio::spawn(worker_loop(ctx.clone(), slot)));
    }
    for worker in workers {
        if let Err(e) = worker.await {
            log::error!("worker task panicked: {e}");
        }
    }

    if let Some(saver) = saver {
        saver.abort();
    }

    if ctx.running.load(Ordering::Acquire) {
        let enable_pagespeed = ctx.config.read().enable_pagespeed;
        if enable_pagespeed {
            ctx.pagespeed_running.store(true, Ordering::Release);
            run_pagespeed_pass(&ctx).await;
            ctx.pagespeed_running.store(false, Ordering::Release);
        }
        finalize_completed(&ctx).await;
    } else {
        finalize_stopped(&ctx).await;
    }

    if let Some(browser) = &ctx.browser {
        browser.shutdown().await;
    }
    ctx.running.store(false, Ordering::Release);

    let stats = ctx.stats.lock().clone();
    log::info!(
        "crawl finished. discovered: {}, crawled: {}",
        stats.discovered,
        stats.crawled
    );
}

async fn discover_sitemap_urls(ctx: &Arc<CrawlContext>) {
    let directives = ctx.robots.sitemap_directives(&ctx.base_url).await;
    let found = ctx.sitemaps.discover(&ctx.base_url, &directives).await;

    let mut added = 0usize;
    let mut filtered = 0usize;
    for url in found {
        if should_crawl(ctx, &url).await {
            if ctx.links.add_url(&url, 0) {
                added += 1;
            }
        } else {
            filtered += 1;
        }
    }
    log::info!("sitemap processing: {added} added, {filtered} filtered");
    ctx.stats.lock().discovered = ctx.links.stats().discovered;
}

async fn worker_loop(ctx: Arc<CrawlContext>, slot: usize) {
    log::debug!("worker {slot} started");

    loop {
        if !ctx.running.load(Ordering::Acquire) {
            break;
        }
        if ctx.paused.load(Ordering::Acquire) {
            tokio::time::sleep(PAUSE_POLL).await;
            continue;
        }

        let (max_depth, max_urls, fast_path) = {
            let config = ctx.config.read();
            (config.max_depth, config.max_urls, config.is_fast_path())
        };

        if ctx.claimed.load(Ordering::Acquire) >= max_urls {
            break;
        }

        let Some(entry) = ctx.links.get_next() else {
            if ctx.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        // Raise in-flight immediately so peers do not observe an empty
        // queue with no work and exit while this entry is being vetted.
        ctx.in_flight.fetch_add(1, Ordering::AcqRel);

        if entry.depth > max_depth {
            ctx.in_flight.fetch_sub(1, Ordering::AcqRel);
            continue;
        }

        // Claim a budget slot before fetching; in-flight work counts
        // against max_urls, so the budget cannot be overshot.
        if ctx.claimed.fetch_add(1, Ordering::AcqRel) >= max_urls {
            ctx.claimed.fetch_sub(1, Ordering::AcqRel);
            ctx.in_flight.fetch_sub(1, Ordering::AcqRel);
            break;
        }

        if !fast_path {
            ctx.limiter.acquire().await;
        }

        log::info!("crawling [depth {}]: {}", entry.depth, entry.url);
        let (record, new_links, candidates) = crawl_one(&ctx, &entry).await;

        ctx.links.mark_visited(&entry.url);

        // Counter bump, record append and depth stat form one critical
        // section so snapshots never see them out of step.
        {
            let mut results = ctx.results.lock();
            let mut stats = ctx.stats.lock();
            stats.crawled += 1;
            stats.max_depth_reached = stats.max_depth_reached.max(record.depth);
            results.push(record.clone());
        }

        let new_issues = ctx.detector.detect(&record);

        if ctx.store.is_some() {
            let batch_full = {
                let mut unsaved = ctx.unsaved.lock();
                unsaved.urls.push(record.clone());
                unsaved.links.extend(new_links);
                unsaved.issues.extend(new_issues);
                unsaved.urls.len() >= URL_BATCH_SIZE
            };
            if batch_full {
                flush_to_store(&ctx, false).await;
            }
        }

        for candidate in candidates {
            if should_crawl(&ctx, &candidate).await {
                ctx.links.add_url(&candidate, entry.depth + 1);
            }
        }
        {
            let mut stats = ctx.stats.lock();
            stats.discovered = stats.discovered.max(ctx.links.stats().discovered);
        }

        ctx.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    log::debug!("worker {slot} exiting");
}

/// Fetch and process a single URL. Returns the finished record, the link
/// rows it contributed and the outbound URLs eligible for enqueueing.
async fn crawl_one(
    ctx: &Arc<CrawlContext>,
    entry: &QueueEntry,
) -> (PageRecord, Vec<LinkRecord>, Vec<String>) {
    let started = Instant::now();
    let config = ctx.config.read().clone();
    let is_internal = ctx.links.is_internal(&entry.url);
    let browser = if config.enable_javascript {
        ctx.browser.as_ref()
    } else {
        None
    };
    let use_browser = browser.is_some();

    let fetched = if let Some(pool) = browser {
        let rendered = pool.render(&entry.url).await;
        if let Some(error) = rendered.error {
            let mut record =
                PageRecord::failed(&entry.url, entry.depth, rendered.status_code, error);
            record.is_internal = is_internal;
            record.javascript_rendered = true;
            record.response_time_ms = started.elapsed().as_millis() as u64;
            return (record, Vec::new(), Vec::new());
        }
        FetchedPage {
            status_code: rendered.status_code,
            content_type: "text/html".to_string(),
            size: rendered.html.len() as u64,
            body: rendered.html,
            redirects: Vec::new(),
            is_html: true,
        }
    } else {
        match ctx.fetcher.fetch(&entry.url, &config).await {
            Ok(page) => page,
            Err(error) => {
                let mut record = PageRecord::failed(&entry.url, entry.depth, 0, error);
                record.is_internal = is_internal;
                record.response_time_ms = started.elapsed().as_millis() as u64;
                return (record, Vec::new(), Vec::new());
            }
        }
    };

    let mut record = PageRecord {
        url: entry.url.clone(),
        status_code: fetched.status_code,
        content_type: fetched.content_type,
        size: fetched.size,
        is_internal,
        depth: entry.depth,
        redirects: fetched.redirects,
        javascript_rendered: use_browser,
        ..PageRecord::default()
    };

    let (new_links, candidates) = if fetched.is_html {
        // The parsed document stays inside this block: it is not Send and
        // must never be held across an await.
        let doc = Html::parse_document(&fetched.body);
        let page_url = Url::parse(&entry.url).unwrap_or_else(|_| ctx.base_url.clone());

        page_extractor::populate_seo_fields(
            &mut record,
            &doc,
            &page_url,
            &fetched.body,
            ctx.links.base_domain(),
        );

        let new_links = ctx.links.collect_links(&doc, &page_url);
        let extract = (is_internal || config.crawl_external) && entry.depth < config.max_depth;
        let candidates = if extract {
            ctx.links.extract_candidates(&doc, &page_url)
        } else {
            Vec::new()
        };
        (new_links, candidates)
    } else {
        (Vec::new(), Vec::new())
    };

    record.linked_from = ctx.links.source_pages_of(&entry.url);
    record.response_time_ms = started.elapsed().as_millis() as u64;

    (record, new_links, candidates)
}

/// Enqueue policy: external-domain rule, robots, extension allow/deny
/// lists, then include/exclude regexes (exclude wins).
async fn should_crawl(ctx: &Arc<CrawlContext>, url: &str) -> bool {
    let (crawl_external, respect_robots, user_agent, include_ext, exclude_ext, include_re, exclude_re) = {
        let config = ctx.config.read();
        (
            config.crawl_external,
            config.respect_robots,
            config.user_agent.clone(),
            config.include_extensions.clone(),
            config.exclude_extensions.clone(),
            config.include_patterns_compiled().to_vec(),
            config.exclude_patterns_compiled().to_vec(),
        )
    };

    if !crawl_external && !ctx.links.is_internal(url) {
        return false;
    }

    if respect_robots && !ctx.robots.can_fetch(&user_agent, url).await {
        log::debug!("robots.txt disallows {url}");
        return false;
    }

    if let Ok(parsed) = Url::parse(url)
        && let Some(ext) = url_utils::path_extension(&parsed)
    {
        if exclude_ext.iter().any(|e| *e == ext) {
            return false;
        }
        if !include_ext.is_empty() && !include_ext.iter().any(|e| *e == ext) {
            return false;
        }
    }

    if exclude_re.iter().any(|re| re.is_match(url)) {
        return false;
    }
    if !include_re.is_empty() && !include_re.iter().any(|re| re.is_match(url)) {
        return false;
    }

    true
}

// Completion -------------------------------------------------------------

async fn finalize_completed(ctx: &Arc<CrawlContext>) {
    let results = ctx.results.lock().clone();
    ctx.links.update_link_statuses(&results);

    {
        let mut results = ctx.results.lock();
        for record in results.iter_mut() {
            let sources = ctx.links.source_pages_of(&record.url);
            if !sources.is_empty() {
                record.linked_from = sources;
            }
        }
    }

    let (check_duplicates, threshold) = {
        let config = ctx.config.read();
        (config.enable_duplication_check, config.duplication_threshold)
    };
    if check_duplicates {
        log::info!("running duplicate content detection");
        let results = ctx.results.lock().clone();
        let new_issues = ctx.detector.detect_duplicates(&results, threshold);
        if ctx.store.is_some() && !new_issues.is_empty() {
            ctx.unsaved.lock().issues.extend(new_issues);
        }
        log::info!(
            "duplicate detection complete, total issues: {}",
            ctx.detector.issue_count()
        );
    }

    flush_to_store(ctx, true).await;
    if let (Some(store), Some(id)) = (&ctx.store, ctx.crawl_id)
        && let Err(e) = store.set_status(id, CrawlStatus::Completed).await
    {
        log::warn!("could not persist completed status: {e}");
    }
    ctx.set_status(CrawlStatus::Completed);
}

async fn finalize_stopped(ctx: &Arc<CrawlContext>) {
    flush_to_store(ctx, true).await;
    save_checkpoint(ctx).await;
    if let (Some(store), Some(id)) = (&ctx.store, ctx.crawl_id)
        && let Err(e) = store.set_status(id, CrawlStatus::Stopped).await
    {
        log::warn!("could not persist stopped status: {e}");
    }
    ctx.set_status(CrawlStatus::Stopped);
}

async fn run_pagespeed_pass(ctx: &Arc<CrawlContext>) {
    let selected = {
        let results = ctx.results.lock();
        pagespeed::select_pages(&results)
    };
    if selected.is_empty() {
        log::info!("no suitable pages for PageSpeed analysis");
        return;
    }

    let (api_key, retries) = {
        let config = ctx.config.read();
        (config.google_api_key.clone(), config.retries)
    };
    let client = ctx.fetcher.client();

    log::info!("running PageSpeed analysis on {} pages", selected.len());
    for (index, url) in selected.iter().enumerate() {
        if !ctx.running.load(Ordering::Acquire) {
            log::info!("PageSpeed analysis cancelled");
            return;
        }

        let mobile = pagespeed::analyze(&client, url, "mobile", api_key.as_deref(), retries).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        if !ctx.running.load(Ordering::Acquire) {
            return;
        }
        let desktop =
            pagespeed::analyze(&client, url, "desktop", api_key.as_deref(), retries).await;

        ctx.pagespeed.lock().push(PageSpeedSummary {
            url: url.clone(),
            mobile,
            desktop,
            analyzed_at: Utc::now(),
        });

        if index + 1 < selected.len() {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
    }
}

// Persistence helpers ----------------------------------------------------

async fn auto_save_loop(ctx: Arc<CrawlContext>) {
    let mut tick = tokio::time::interval(AUTO_SAVE_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        if !ctx.running.load(Ordering::Acquire) {
            break;
        }
        let due = ctx.unsaved.lock().last_save.elapsed() >= AUTO_SAVE_INTERVAL;
        if due {
            flush_to_store(&ctx, true).await;
            save_checkpoint(&ctx).await;
        }
    }
}

/// Flush buffered rows. On failure the rows are put back so the next flush
/// retries them; the crawl itself keeps going in memory.
async fn flush_to_store(ctx: &Arc<CrawlContext>, force: bool) {
    let (Some(store), Some(crawl_id)) = (&ctx.store, ctx.crawl_id) else {
        return;
    };

    let (urls, links, issues) = {
        let mut unsaved = ctx.unsaved.lock();
        if !force && unsaved.urls.is_empty() && unsaved.links.is_empty() && unsaved.issues.is_empty()
        {
            return;
        }
        (
            std::mem::take(&mut unsaved.urls),
            std::mem::take(&mut unsaved.links),
            std::mem::take(&mut unsaved.issues),
        )
    };

    let result: Result<(), CrawlError> = async {
        store.save_url_batch(crawl_id, &urls).await?;
        store.save_links_batch(crawl_id, &links).await?;
        store.save_issues_batch(crawl_id, &issues).await?;
        let stats = ctx.stats.lock().clone();
        let memory = ctx.memory.current();
        store.update_stats(crawl_id, &stats, memory).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            ctx.unsaved.lock().last_save = Instant::now();
            log::debug!("flushed batch for crawl {crawl_id}");
        }
        Err(e) => {
            log::warn!("batch save failed, retrying on next flush: {e}");
            let mut unsaved = ctx.unsaved.lock();
            let mut urls = urls;
            urls.extend(std::mem::take(&mut unsaved.urls));
            unsaved.urls = urls;
            let mut links = links;
            links.extend(std::mem::take(&mut unsaved.links));
            unsaved.links = links;
            let mut issues = issues;
            issues.extend(std::mem::take(&mut unsaved.issues));
            unsaved.issues = issues;
        }
    }
}

async fn save_checkpoint(ctx: &Arc<CrawlContext>) {
    let (Some(store), Some(crawl_id)) = (&ctx.store, ctx.crawl_id) else {
        return;
    };

    let checkpoint = QueueCheckpoint {
        discovered_urls: ctx.links.pending_snapshot(CHECKPOINT_PENDING_LIMIT),
        visited_urls: ctx.links.visited_snapshot(),
    };
    if let Err(e) = store.save_checkpoint(crawl_id, &checkpoint).await {
        log::warn!("checkpoint save failed: {e}");
    } else {
        log::debug!("saved queue checkpoint for crawl {crawl_id}");
    }
}

/// With no usable checkpoint, rebuild the pending queue from internal link
/// targets that were never crawled.
fn rebuild_queue_from_links(ctx: &Arc<CrawlContext>) {
    log::info!("queue is empty, rebuilding from discovered links");
    let crawled: HashSet<String> = ctx
        .results
        .lock()
        .iter()
        .map(|r| r.url.clone())
        .collect();

    let mut added = 0usize;
    for link in ctx.links.links_snapshot() {
        if link.is_internal && !crawled.contains(&link.target_url) {
            // Persisted link rows carry no depth; treat rebuilt entries as
            // one hop from the seed.
            if ctx.links.add_url(&link.target_url, 1) {
                added += 1;
            }
        }
    }

    if added == 0 {
        log::info!("no pending URLs found, crawl was already complete");
    } else {
        log::info!("rebuilt queue with {added} pending URLs");
    }
    let mut stats = ctx.stats.lock();
    stats.discovered = stats.discovered.max(ctx.links.stats().discovered);
}
