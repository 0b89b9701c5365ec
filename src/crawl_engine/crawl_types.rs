//! Core types for crawl operations: errors, lifecycle states, statistics
//! and queue entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::page_extractor::schema::{IssueRecord, LinkRecord, PageRecord};

/// Error taxonomy surfaced at the engine API boundary. Per-URL failures do
/// not appear here; they become status-0 records and the crawl continues.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid seed URL: {0}")]
    InvalidSeed(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("persistence error: {0}")]
    Store(String),
    #[error("crawl already in progress")]
    AlreadyRunning,
    #[error("no crawl in progress")]
    NotRunning,
    #[error("crawl is not paused")]
    NotPaused,
    #[error("cannot resume crawl with status: {0}")]
    NotResumable(String),
    #[error("unauthorized: crawl belongs to another user")]
    Unauthorized,
}

/// Lifecycle state of a crawl.
///
/// Transitions: `Idle → Running → {Paused ↔ Running} → {Completed | Stopped
/// | Failed}`. Terminal states are never left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl CrawlStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// Parse a persisted status string. Unknown strings map to `Failed`,
    /// which keeps such rows resumable-by-inspection but never running.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "idle" => Self::Idle,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "stopped" => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry in the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: String,
    pub depth: u8,
}

/// Aggregate counters for a crawl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub discovered: usize,
    pub crawled: usize,
    pub max_depth_reached: u8,
    pub speed_rps: f64,
    pub start_time: Option<DateTime<Utc>>,
}

/// Memory figures reported in the status snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub rss_mb: f64,
    pub peak_mb: f64,
    pub estimated_crawl_mb: f64,
}

/// Owned snapshot of everything an API consumer needs; copies only, so no
/// internal structure escapes the engine's locks.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: CrawlStatus,
    pub stats: CrawlStats,
    pub urls: Vec<PageRecord>,
    pub links: Vec<LinkRecord>,
    pub issues: Vec<IssueRecord>,
    pub progress_pct: f64,
    pub is_running_pagespeed: bool,
    pub memory: MemoryStats,
    pub pagespeed: Vec<crate::crawl_engine::pagespeed::PageSpeedSummary>,
}

impl StatusSnapshot {
    /// The snapshot of an orchestrator that has never started a crawl.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            status: CrawlStatus::Idle,
            stats: CrawlStats::default(),
            urls: Vec::new(),
            links: Vec::new(),
            issues: Vec::new(),
            progress_pct: 0.0,
            is_running_pagespeed: false,
            memory: MemoryStats::default(),
            pagespeed: Vec::new(),
        }
    }
}
