//! Session registry isolation and idle eviction.

use crawlscope::{CrawlConfig, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn sessions_are_isolated_and_reused() {
    let registry = SessionRegistry::new(CrawlConfig::default());

    let first = registry.get_or_create("alice", Some(1), Some("free"));
    let again = registry.get_or_create("alice", Some(1), Some("free"));
    let other = registry.get_or_create("bob", Some(2), None);

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn idle_sessions_are_evicted() {
    let registry = SessionRegistry::new(CrawlConfig::default());
    registry.get_or_create("stale", None, None);
    assert_eq!(registry.len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let evicted = registry.evict_idle(Duration::from_millis(1)).await;
    assert_eq!(evicted, 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn recent_sessions_survive_eviction() {
    let registry = SessionRegistry::new(CrawlConfig::default());
    registry.get_or_create("fresh", None, None);

    let evicted = registry.evict_idle(Duration::from_secs(3600)).await;
    assert_eq!(evicted, 0);
    assert_eq!(registry.len(), 1);

    // A lookup refreshes the idle clock.
    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.touch("fresh");
    let evicted = registry.evict_idle(Duration::from_millis(15)).await;
    assert_eq!(evicted, 0);
}

#[tokio::test]
async fn remove_returns_the_orchestrator() {
    let registry = SessionRegistry::new(CrawlConfig::default());
    let created = registry.get_or_create("gone", None, None);
    let removed = registry.remove("gone").unwrap();
    assert!(Arc::ptr_eq(&created, &removed));
    assert!(registry.remove("gone").is_none());
}

#[tokio::test]
async fn shutdown_drains_everything() {
    let registry = SessionRegistry::new(CrawlConfig::default());
    registry.get_or_create("a", None, None);
    registry.get_or_create("b", None, None);
    registry.start_cleanup_task();
    registry.shutdown().await;
    assert!(registry.is_empty());
}
