//! crawlscope: a concurrent SEO crawl engine.
//!
//! Given a seed URL, the engine walks the target host breadth-first,
//! extracts structured SEO signals from every page, builds the link graph,
//! detects quality issues (including cross-page near-duplicates), and can
//! checkpoint and resume a crawl through its sqlite store. Fetching runs
//! either over plain HTTP or through a pooled headless browser.
//!
//! The main entry points are [`CrawlOrchestrator`] for a single crawl and
//! [`SessionRegistry`] for per-tenant isolation.
//!
//! ```no_run
//! use crawlscope::{CrawlConfig, CrawlOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = CrawlOrchestrator::new(CrawlConfig::default());
//!     orchestrator.start("https://example.com", None, None).await?;
//!
//!     loop {
//!         let snapshot = orchestrator.get_status();
//!         if snapshot.status.is_terminal() {
//!             println!("{} pages, {} issues", snapshot.urls.len(), snapshot.issues.len());
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod browser_pool;
pub mod config;
pub mod crawl_engine;
pub mod issues;
pub mod page_extractor;
pub mod session;
pub mod store;
pub mod utils;

pub use browser_pool::{BrowserPagePool, RenderedPage};
pub use config::{BrowserEngine, CrawlConfig, FAST_PATH_RPS};
pub use crawl_engine::{
    CrawlError, CrawlOrchestrator, CrawlStats, CrawlStatus, LinkManager, MemoryStats, QueueEntry,
    RateLimiter, RobotsCache, SitemapParser, StatusSnapshot,
};
pub use issues::IssueDetector;
pub use page_extractor::schema::{
    AnalyticsTags, HreflangEntry, ImageRef, IssueRecord, IssueSeverity, LinkPlacement, LinkRecord,
    PageRecord,
};
pub use session::{SessionEntry, SessionRegistry};
pub use store::{CrawlHeader, CrawlStore, QueueCheckpoint};
