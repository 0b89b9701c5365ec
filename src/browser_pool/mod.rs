//! Headless browser page pool for the JavaScript fetch path.
//!
//! One browser, a fixed pool of pre-created pages. `render` borrows a page,
//! navigates, waits for scripts to settle and dumps the rendered HTML; the
//! page goes back to the pool whether or not the navigation succeeded.
//!
//! When `REMOTE_BROWSER` is set the pool attaches to that endpoint over CDP
//! and never launches locally; the two modes are mutually exclusive.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrowserEngine, CrawlConfig};

/// Environment variable naming a CDP endpoint to attach to.
pub const REMOTE_BROWSER_ENV: &str = "REMOTE_BROWSER";

/// Result of rendering one URL.
#[derive(Debug)]
pub struct RenderedPage {
    pub html: String,
    pub status_code: u16,
    pub error: Option<String>,
}

impl RenderedPage {
    fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            html: String::new(),
            status_code,
            error: Some(error.into()),
        }
    }
}

#[derive(Default)]
struct PoolInner {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    pages: VecDeque<Page>,
    initialized: bool,
}

/// Fixed-size pool of rendering pages over a single browser.
pub struct BrowserPagePool {
    pool_size: usize,
    wait_time: Duration,
    nav_timeout: Duration,
    headless: bool,
    engine: BrowserEngine,
    user_agent: String,
    viewport: (u32, u32),
    inner: Mutex<PoolInner>,
    page_returned: Notify,
}

impl BrowserPagePool {
    #[must_use]
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            pool_size: config.js_max_concurrent_pages,
            wait_time: Duration::from_secs(config.js_wait_time),
            nav_timeout: Duration::from_secs(config.js_timeout),
            headless: config.js_headless,
            engine: config.js_browser,
            user_agent: config.js_user_agent.clone(),
            viewport: (config.js_viewport_width, config.js_viewport_height),
            inner: Mutex::new(PoolInner::default()),
            page_returned: Notify::new(),
        }
    }

    /// Launch (or attach to) the browser and pre-create the page pool.
    /// Calling this on an initialized pool is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.initialized {
            return Ok(());
        }

        let (browser, mut handler) = match remote_endpoint() {
            Some(endpoint) => {
                info!("attaching to remote browser over CDP: {endpoint}");
                Browser::connect(endpoint)
                    .await
                    .context("Failed to connect to remote browser")?
            }
            None => {
                if self.engine != BrowserEngine::Chromium {
                    warn!(
                        "browser engine {:?} has no local CDP launcher, using chromium",
                        self.engine
                    );
                }
                let config = self.local_browser_config()?;
                Browser::launch(config)
                    .await
                    .context("Failed to launch browser")?
            }
        };

        // Drive the CDP connection until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut pages = VecDeque::with_capacity(self.pool_size);
        for _ in 0..self.pool_size {
            let page = browser
                .new_page("about:blank")
                .await
                .context("Failed to create pooled page")?;
            page.set_user_agent(self.user_agent.as_str())
                .await
                .context("Failed to set page user agent")?;
            page.execute(
                SetDeviceMetricsOverrideParams::builder()
                    .width(i64::from(self.viewport.0))
                    .height(i64::from(self.viewport.1))
                    .device_scale_factor(1.0)
                    .mobile(false)
                    .build()
                    .map_err(|e| anyhow::anyhow!("viewport params: {e}"))?,
            )
            .await
            .context("Failed to set page viewport")?;
            pages.push_back(page);
        }

        info!("browser page pool ready with {} pages", pages.len());
        inner.browser = Some(browser);
        inner.handler_task = Some(handler_task);
        inner.pages = pages;
        inner.initialized = true;
        Ok(())
    }

    /// Render a URL: navigate, wait for scripts, dump the DOM.
    pub async fn render(&self, url: &str) -> RenderedPage {
        let Some(page) = self.acquire_page().await else {
            return RenderedPage::failure(0, "No rendering page available");
        };

        let result = self.render_on(&page, url).await;
        self.release_page(page).await;

        match result {
            Ok(html) => RenderedPage {
                html,
                status_code: 200,
                error: None,
            },
            Err(e) => RenderedPage::failure(0, format!("{e:#}")),
        }
    }

    async fn render_on(&self, page: &Page, url: &str) -> Result<String> {
        match tokio::time::timeout(self.nav_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(anyhow::anyhow!("Navigation error: {e}")),
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "JavaScript rendering timeout after {}s",
                    self.nav_timeout.as_secs()
                ));
            }
        }

        // Give client-side scripts time to populate the DOM.
        tokio::time::sleep(self.wait_time).await;

        page.content()
            .await
            .context("Failed to read rendered content")
    }

    async fn acquire_page(&self) -> Option<Page> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if !inner.initialized {
                    return None;
                }
                if let Some(page) = inner.pages.pop_front() {
                    return Some(page);
                }
            }
            self.page_returned.notified().await;
        }
    }

    async fn release_page(&self, page: Page) {
        let mut inner = self.inner.lock().await;
        if inner.initialized {
            inner.pages.push_back(page);
        }
        drop(inner);
        self.page_returned.notify_one();
    }

    /// Close pages and the browser. Safe to call repeatedly; waiters inside
    /// `acquire_page` are woken and observe the teardown.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.initialized {
            return;
        }
        inner.initialized = false;

        while let Some(page) = inner.pages.pop_front() {
            if let Err(e) = page.close().await {
                debug!("error closing pooled page: {e}");
            }
        }

        if let Some(mut browser) = inner.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("error closing browser: {e}");
            }
            let _ = browser.wait().await;
        }

        if let Some(task) = inner.handler_task.take() {
            task.abort();
        }
        drop(inner);

        self.page_returned.notify_waiters();
        info!("browser page pool shut down");
    }
}

fn remote_endpoint() -> Option<String> {
    match std::env::var(REMOTE_BROWSER_ENV) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

impl BrowserPagePool {
    fn local_browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.viewport.0, self.viewport.1)
            .args(vec!["--no-sandbox", "--disable-dev-shm-usage"]);
        if !self.headless {
            builder = builder.with_head();
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("browser config: {e}"))
    }
}
