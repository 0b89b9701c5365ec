//! Configuration for crawl operations.

mod methods;
mod types;

pub use methods::FAST_PATH_RPS;
pub use types::{BrowserEngine, CrawlConfig};
