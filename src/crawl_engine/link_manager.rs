//! Discovered/visited bookkeeping, the pending queue and the link graph.
//!
//! All mutable state sits behind a single mutex; every critical section is
//! short and never performs I/O. External readers receive copies so no
//! internal structure escapes the lock.
//!
//! Enqueue is gated by the all-discovered set, which is what makes cyclic
//! link graphs safe: a URL enters the pending queue at most once per crawl.

use parking_lot::Mutex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use url::Url;

use super::crawl_types::QueueEntry;
use crate::page_extractor::extractors::resolve_href;
use crate::page_extractor::schema::{LinkPlacement, LinkRecord, PageRecord};
use crate::utils::url_utils;

static ANCHOR: once_cell::sync::Lazy<Selector> =
    once_cell::sync::Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

#[derive(Default)]
struct LinkState {
    pending: VecDeque<QueueEntry>,
    all_discovered: HashSet<String>,
    visited: HashSet<String>,
    all_links: Vec<LinkRecord>,
    /// Companion set for O(1) dedup of `(source, target)` pairs.
    links_seen: HashSet<(String, String)>,
    /// Internal inbound edges: target URL → set of source URLs.
    source_pages: HashMap<String, BTreeSet<String>>,
}

/// Counters exposed to the orchestrator's stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkStats {
    pub discovered: usize,
    pub pending: usize,
    pub visited: usize,
}

/// Shared link and queue state for one crawl.
pub struct LinkManager {
    base_domain: String,
    state: Mutex<LinkState>,
}

impl LinkManager {
    #[must_use]
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
            state: Mutex::new(LinkState::default()),
        }
    }

    #[must_use]
    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Host exactly equals the crawl's base domain. Subdomains are external.
    #[must_use]
    pub fn is_internal(&self, url: &str) -> bool {
        url_utils::domain_of(url).as_deref() == Some(self.base_domain.as_str())
    }

    /// Normalize and enqueue a URL unless it was ever discovered before.
    /// Returns whether the URL was enqueued.
    pub fn add_url(&self, url: &str, depth: u8) -> bool {
        let Some(normalized) = url_utils::normalize_url(url) else {
            return false;
        };

        let mut state = self.state.lock();
        if !state.all_discovered.insert(normalized.clone()) {
            return false;
        }
        state.pending.push_back(QueueEntry {
            url: normalized,
            depth,
        });
        true
    }

    /// Dequeue the next URL. The caller owns it until `mark_visited`.
    /// Entries whose URL was visited in the meantime (possible after a
    /// resume from an older checkpoint) are discarded, keeping the queue
    /// disjoint from the visited set at the moment of dequeue.
    pub fn get_next(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock();
        while let Some(entry) = state.pending.pop_front() {
            if !state.visited.contains(&entry.url) {
                return Some(entry);
            }
        }
        None
    }

    /// Record that a URL's fetch has returned (any status).
    pub fn mark_visited(&self, url: &str) {
        self.state.lock().visited.insert(url.to_string());
    }

    #[must_use]
    pub fn stats(&self) -> LinkStats {
        let state = self.state.lock();
        LinkStats {
            discovered: state.all_discovered.len(),
            pending: state.pending.len(),
            visited: state.visited.len(),
        }
    }

    /// Walk every anchor of a page, classify it and append new edges to the
    /// link graph. Returns the newly added records (for persistence
    /// batching); duplicates of existing edges are collapsed.
    pub fn collect_links(&self, doc: &Html, source_url: &Url) -> Vec<LinkRecord> {
        let source = source_url.to_string();
        let mut new_links = Vec::new();

        let mut state = self.state.lock();
        for el in doc.select(&ANCHOR) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Some(target) = resolve_href(source_url, href) else {
                continue;
            };

            let key = (source.clone(), target.clone());
            if state.links_seen.contains(&key) {
                continue;
            }
            state.links_seen.insert(key);

            let target_domain = url_utils::domain_of(&target).unwrap_or_default();
            let is_internal = target_domain == self.base_domain;
            let record = LinkRecord {
                source_url: source.clone(),
                target_url: target.clone(),
                anchor_text: anchor_text(el),
                is_internal,
                target_domain,
                target_status: None,
                placement: placement_of(el),
            };

            if is_internal {
                state
                    .source_pages
                    .entry(target)
                    .or_default()
                    .insert(source.clone());
            }

            state.all_links.push(record.clone());
            new_links.push(record);
        }

        new_links
    }

    /// Outbound candidates for further crawling: normalized anchor targets
    /// not yet discovered. The orchestrator applies its crawl policy and
    /// enqueues the survivors.
    #[must_use]
    pub fn extract_candidates(&self, doc: &Html, source_url: &Url) -> Vec<String> {
        let state = self.state.lock();
        let mut seen_here = HashSet::new();
        let mut candidates = Vec::new();

        for el in doc.select(&ANCHOR) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Some(target) = resolve_href(source_url, href) else {
                continue;
            };
            if state.all_discovered.contains(&target) {
                continue;
            }
            if seen_here.insert(target.clone()) {
                candidates.push(target);
            }
        }

        candidates
    }

    /// Snapshot of the internal pages linking to `url`.
    #[must_use]
    pub fn source_pages_of(&self, url: &str) -> Vec<String> {
        self.state
            .lock()
            .source_pages
            .get(url)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Backfill `target_status` for links whose target has been crawled.
    pub fn update_link_statuses(&self, results: &[PageRecord]) {
        let statuses: HashMap<&str, u16> = results
            .iter()
            .map(|r| (r.url.as_str(), r.status_code))
            .collect();

        let mut state = self.state.lock();
        for link in &mut state.all_links {
            if link.target_status.is_none()
                && let Some(status) = statuses.get(link.target_url.as_str())
            {
                link.target_status = Some(*status);
            }
        }
    }

    #[must_use]
    pub fn links_snapshot(&self) -> Vec<LinkRecord> {
        self.state.lock().all_links.clone()
    }

    /// First `limit` pending entries, for checkpointing.
    #[must_use]
    pub fn pending_snapshot(&self, limit: usize) -> Vec<QueueEntry> {
        self.state.lock().pending.iter().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn visited_snapshot(&self) -> Vec<String> {
        self.state.lock().visited.iter().cloned().collect()
    }

    // Resume support ------------------------------------------------------

    /// Mark URLs as already discovered so they are never re-enqueued.
    pub fn seed_discovered<I: IntoIterator<Item = String>>(&self, urls: I) {
        let mut state = self.state.lock();
        state.all_discovered.extend(urls);
    }

    /// Restore queue and visited set from a checkpoint. Pending entries are
    /// also marked discovered, preserving the pending/visited disjointness.
    pub fn restore_queue(&self, pending: Vec<QueueEntry>, visited: Vec<String>) {
        let mut state = self.state.lock();
        for entry in &pending {
            state.all_discovered.insert(entry.url.clone());
        }
        state.visited.extend(visited);
        state.pending = pending.into();
    }

    /// Reload persisted link rows, rebuilding the dedup set and the
    /// source-pages reverse map.
    pub fn restore_links(&self, links: Vec<LinkRecord>) {
        let mut state = self.state.lock();
        for link in &links {
            state
                .links_seen
                .insert((link.source_url.clone(), link.target_url.clone()));
            if link.is_internal {
                state
                    .source_pages
                    .entry(link.target_url.clone())
                    .or_default()
                    .insert(link.source_url.clone());
            }
        }
        state.all_links = links;
    }
}

fn anchor_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Nearest structural ancestor decides placement; anchors outside nav,
/// footer and head count as body.
fn placement_of(el: ElementRef<'_>) -> LinkPlacement {
    for ancestor in el.ancestors() {
        let Some(ancestor_el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        match ancestor_el.value().name() {
            "nav" => return LinkPlacement::Nav,
            "footer" => return LinkPlacement::Footer,
            "head" => return LinkPlacement::Head,
            _ => {}
        }
    }
    LinkPlacement::Body
}
