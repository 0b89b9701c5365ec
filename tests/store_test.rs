//! Persistence round-trips, checkpointing and crash-recovery scans.

use crawlscope::page_extractor::schema::{
    ImageRef, IssueRecord, IssueSeverity, LinkPlacement, LinkRecord, PageRecord,
};
use crawlscope::{CrawlConfig, CrawlStats, CrawlStatus, CrawlStore, MemoryStats, QueueCheckpoint, QueueEntry};
use std::path::PathBuf;

fn db_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("crawls.db")
}

fn sample_record(url: &str) -> PageRecord {
    PageRecord {
        url: url.to_string(),
        status_code: 200,
        content_type: "text/html".to_string(),
        size: 2048,
        is_internal: true,
        depth: 1,
        title: "Stored page".to_string(),
        meta_description: "A record that exercises the JSON columns.".to_string(),
        h1: "Stored".to_string(),
        h2: vec!["Sub one".to_string(), "Sub two".to_string()],
        word_count: 420,
        og_tags: [("og:title".to_string(), "Stored".to_string())].into(),
        json_ld: vec![serde_json::json!({"@type": "Article"})],
        images: vec![ImageRef {
            src: "https://s.test/i.png".to_string(),
            alt: "pic".to_string(),
        }],
        internal_links: 3,
        external_links: 1,
        response_time_ms: 120,
        linked_from: vec!["https://s.test/".to_string()],
        ..PageRecord::default()
    }
}

#[tokio::test]
async fn url_rows_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = CrawlStore::open(&db_path(&dir)).await.unwrap();
    let crawl_id = store
        .create_crawl(
            Some(7),
            "session-1",
            "https://s.test/",
            "s.test",
            &CrawlConfig::default(),
        )
        .await
        .unwrap();

    let records = vec![sample_record("https://s.test/a"), sample_record("https://s.test/b")];
    store.save_url_batch(crawl_id, &records).await.unwrap();

    let loaded = store.load_urls(crawl_id).await.unwrap();
    assert_eq!(loaded.len(), 2);
    let first = &loaded[0];
    assert_eq!(first.url, "https://s.test/a");
    assert_eq!(first.status_code, 200);
    assert_eq!(first.h2, vec!["Sub one", "Sub two"]);
    assert_eq!(first.og_tags.get("og:title").unwrap(), "Stored");
    assert_eq!(first.json_ld[0]["@type"], "Article");
    assert_eq!(first.images[0].alt, "pic");
    assert_eq!(first.linked_from, vec!["https://s.test/"]);
    assert_eq!(first.response_time_ms, 120);
    assert!(first.is_internal);
}

#[tokio::test]
async fn link_and_issue_rows_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = CrawlStore::open(&db_path(&dir)).await.unwrap();
    let crawl_id = store
        .create_crawl(None, "session-2", "https://s.test/", "s.test", &CrawlConfig::default())
        .await
        .unwrap();

    let links = vec![LinkRecord {
        source_url: "https://s.test/".to_string(),
        target_url: "https://s.test/a".to_string(),
        anchor_text: "A".to_string(),
        is_internal: true,
        target_domain: "s.test".to_string(),
        target_status: Some(200),
        placement: LinkPlacement::Nav,
    }];
    store.save_links_batch(crawl_id, &links).await.unwrap();

    let issues = vec![IssueRecord {
        url: "https://s.test/a".to_string(),
        severity: IssueSeverity::Error,
        category: "SEO".to_string(),
        issue: "Missing Title Tag".to_string(),
        details: "Page has no title tag".to_string(),
    }];
    store.save_issues_batch(crawl_id, &issues).await.unwrap();

    let loaded_links = store.load_links(crawl_id).await.unwrap();
    assert_eq!(loaded_links.len(), 1);
    assert_eq!(loaded_links[0].placement, LinkPlacement::Nav);
    assert_eq!(loaded_links[0].target_status, Some(200));

    let loaded_issues = store.load_issues(crawl_id).await.unwrap();
    assert_eq!(loaded_issues.len(), 1);
    assert_eq!(loaded_issues[0].severity, IssueSeverity::Error);
    assert_eq!(loaded_issues[0].issue, "Missing Title Tag");
}

#[tokio::test]
async fn checkpoint_and_header_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = CrawlStore::open(&db_path(&dir)).await.unwrap();
    let config = CrawlConfig {
        max_depth: 5,
        ..CrawlConfig::default()
    };
    let crawl_id = store
        .create_crawl(Some(1), "session-3", "https://s.test/", "s.test", &config)
        .await
        .unwrap();

    let checkpoint = QueueCheckpoint {
        discovered_urls: vec![QueueEntry {
            url: "https://s.test/pending".to_string(),
            depth: 2,
        }],
        visited_urls: vec!["https://s.test/".to_string()],
    };
    store.save_checkpoint(crawl_id, &checkpoint).await.unwrap();

    let stats = CrawlStats {
        discovered: 10,
        crawled: 4,
        max_depth_reached: 2,
        ..CrawlStats::default()
    };
    store
        .update_stats(crawl_id, &stats, MemoryStats::default())
        .await
        .unwrap();
    store.set_status(crawl_id, CrawlStatus::Paused).await.unwrap();

    let header = store.crawl_header(crawl_id).await.unwrap().unwrap();
    assert_eq!(header.status, "paused");
    assert_eq!(header.user_id, Some(1));
    assert_eq!(header.urls_discovered, 10);
    assert_eq!(header.urls_crawled, 4);
    assert_eq!(header.config_snapshot.as_ref().unwrap().max_depth, 5);

    let restored = header.resume_checkpoint.unwrap();
    assert_eq!(restored.discovered_urls[0].url, "https://s.test/pending");
    assert_eq!(restored.discovered_urls[0].depth, 2);
    assert_eq!(restored.visited_urls, vec!["https://s.test/"]);

    assert!(store.crawl_header(crawl_id + 99).await.unwrap().is_none());
}

#[tokio::test]
async fn crashed_crawls_are_running_rows() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = CrawlStore::open(&db_path(&dir)).await.unwrap();

    let running = store
        .create_crawl(None, "s", "https://a.test/", "a.test", &CrawlConfig::default())
        .await
        .unwrap();
    let finished = store
        .create_crawl(None, "s", "https://b.test/", "b.test", &CrawlConfig::default())
        .await
        .unwrap();
    store
        .set_status(finished, CrawlStatus::Completed)
        .await
        .unwrap();

    let crashed = store.crashed_crawls().await.unwrap();
    assert_eq!(crashed.len(), 1);
    assert_eq!(crashed[0].id, running);
}
