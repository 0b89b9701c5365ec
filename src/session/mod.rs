//! Process-wide session registry.
//!
//! Maps tenant sessions to their orchestrators behind a single lock, with
//! lazy allocation and idle eviction. The registry is initialized
//! explicitly at process start (`SessionRegistry::global`) and torn down
//! cooperatively: eviction stops a session's crawl before releasing it,
//! never relying on destructors.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::crawl_engine::CrawlOrchestrator;

/// Cadence of the background eviction sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Sessions idle longer than this are evicted.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// One tenant session: its orchestrator plus bookkeeping for eviction.
pub struct SessionEntry {
    pub orchestrator: Arc<CrawlOrchestrator>,
    pub user_id: Option<i64>,
    pub tier: Option<String>,
    last_accessed: Instant,
}

/// Registry of independent crawl sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    default_config: CrawlConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

static GLOBAL: OnceLock<Arc<SessionRegistry>> = OnceLock::new();

impl SessionRegistry {
    #[must_use]
    pub fn new(default_config: CrawlConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            default_config,
            sweeper: Mutex::new(None),
        })
    }

    /// The process-wide registry, created on first use with default config.
    pub fn global() -> &'static Arc<Self> {
        GLOBAL.get_or_init(|| Self::new(CrawlConfig::default()))
    }

    /// Fetch a session's orchestrator, allocating lazily. Every lookup
    /// refreshes the idle clock.
    pub fn get_or_create(
        &self,
        session_id: &str,
        user_id: Option<i64>,
        tier: Option<&str>,
    ) -> Arc<CrawlOrchestrator> {
        let mut sessions = self.sessions.lock();
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("creating crawler session {session_id}");
                SessionEntry {
                    orchestrator: Arc::new(CrawlOrchestrator::new(self.default_config.clone())),
                    user_id,
                    tier: tier.map(str::to_string),
                    last_accessed: Instant::now(),
                }
            });
        entry.last_accessed = Instant::now();
        entry.orchestrator.clone()
    }

    /// Refresh a session's idle clock without creating it.
    pub fn touch(&self, session_id: &str) {
        if let Some(entry) = self.sessions.lock().get_mut(session_id) {
            entry.last_accessed = Instant::now();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Remove a session explicitly, returning its orchestrator so the
    /// caller can stop any running crawl.
    pub fn remove(&self, session_id: &str) -> Option<Arc<CrawlOrchestrator>> {
        self.sessions
            .lock()
            .remove(session_id)
            .map(|entry| entry.orchestrator)
    }

    /// Evict sessions idle past the timeout, stopping their crawls first.
    /// Returns the number of sessions evicted.
    pub async fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let expired: Vec<(String, Arc<CrawlOrchestrator>)> = {
            let mut sessions = self.sessions.lock();
            let now = Instant::now();
            let expired_ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_accessed) > idle_timeout)
                .map(|(id, _)| id.clone())
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| {
                    sessions
                        .remove(&id)
                        .map(|entry| (id, entry.orchestrator))
                })
                .collect()
        };

        let count = expired.len();
        for (session_id, orchestrator) in expired {
            info!("evicting idle crawler session {session_id}");
            if orchestrator.is_running()
                && let Err(e) = orchestrator.stop().await
            {
                warn!("error stopping crawl for evicted session {session_id}: {e}");
            }
        }
        count
    }

    /// Start the background eviction sweep. Idempotent.
    pub fn start_cleanup_task(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let registry = Arc::clone(self);
        *sweeper = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let evicted = registry.evict_idle(IDLE_TIMEOUT).await;
                if evicted > 0 {
                    info!("evicted {evicted} idle crawler sessions");
                }
            }
        }));
        info!("session cleanup task started");
    }

    /// Stop the sweep and drain every session, stopping running crawls.
    pub async fn shutdown(&self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }
        let _ = self.evict_idle(Duration::ZERO).await;
    }
}
