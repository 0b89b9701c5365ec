//! The crawl engine: scheduling, fetching, link bookkeeping and lifecycle.

pub mod crawl_types;
pub mod fetcher;
pub mod link_manager;
pub mod memory;
pub mod orchestrator;
pub mod pagespeed;
pub mod rate_limiter;
pub mod robots;
pub mod sitemap;

pub use crawl_types::{
    CrawlError, CrawlStats, CrawlStatus, MemoryStats, QueueEntry, StatusSnapshot,
};
pub use fetcher::{FetchedPage, HttpFetcher};
pub use link_manager::{LinkManager, LinkStats};
pub use orchestrator::CrawlOrchestrator;
pub use pagespeed::{PageSpeedOutcome, PageSpeedSummary};
pub use rate_limiter::RateLimiter;
pub use robots::RobotsCache;
pub use sitemap::SitemapParser;
