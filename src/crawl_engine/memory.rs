//! Memory accounting for status snapshots.
//!
//! The crawl data estimate samples a handful of records instead of
//! serializing the whole result set, so `get_status` stays cheap on large
//! crawls. RSS comes from procfs where available.

use parking_lot::Mutex;

use super::crawl_types::MemoryStats;
use crate::page_extractor::schema::PageRecord;

/// Serialized-size guesses for rows that are cheap to bound.
const LINK_ROW_ESTIMATE: usize = 256;
const ISSUE_ROW_ESTIMATE: usize = 192;
/// Records sampled per update when estimating the average record size.
const SAMPLE_SIZE: usize = 16;

#[derive(Debug, Default)]
pub struct MemoryMonitor {
    last: Mutex<MemoryStats>,
}

impl MemoryMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the estimate and fold it into the running peak.
    pub fn update(
        &self,
        records: &[PageRecord],
        link_count: usize,
        issue_count: usize,
    ) -> MemoryStats {
        let record_bytes = estimate_record_bytes(records);
        let estimated = record_bytes
            + link_count * LINK_ROW_ESTIMATE
            + issue_count * ISSUE_ROW_ESTIMATE;
        let estimated_mb = estimated as f64 / 1024.0 / 1024.0;

        let mut last = self.last.lock();
        last.estimated_crawl_mb = estimated_mb;
        last.rss_mb = rss_mb();
        last.peak_mb = last.peak_mb.max(last.rss_mb).max(estimated_mb);
        *last
    }

    /// Last computed figures without recomputing.
    #[must_use]
    pub fn current(&self) -> MemoryStats {
        *self.last.lock()
    }
}

fn estimate_record_bytes(records: &[PageRecord]) -> usize {
    if records.is_empty() {
        return 0;
    }

    let step = (records.len() / SAMPLE_SIZE).max(1);
    let mut sampled = 0usize;
    let mut bytes = 0usize;
    for record in records.iter().step_by(step).take(SAMPLE_SIZE) {
        bytes += serde_json::to_string(record).map_or(1024, |s| s.len());
        sampled += 1;
    }

    if sampled == 0 {
        return 0;
    }
    bytes / sampled * records.len()
}

#[cfg(target_os = "linux")]
fn rss_mb() -> f64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0.0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<f64>().ok())
        .map_or(0.0, |kb| kb / 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn rss_mb() -> f64 {
    0.0
}
