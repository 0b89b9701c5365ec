//! Link manager behavior: queue discipline, graph dedup and the reverse
//! source-pages map.

use crawlscope::page_extractor::schema::{LinkPlacement, PageRecord};
use crawlscope::{LinkManager, QueueEntry};
use scraper::Html;
use url::Url;

fn parsed(html: &str) -> Html {
    Html::parse_document(html)
}

#[test]
fn urls_enqueue_once() {
    let manager = LinkManager::new("example.com");
    assert!(manager.add_url("https://example.com/a", 1));
    assert!(!manager.add_url("https://example.com/a", 2));

    let entry = manager.get_next().unwrap();
    assert_eq!(entry.url, "https://example.com/a");
    assert_eq!(entry.depth, 1);
    assert!(manager.get_next().is_none());

    // Dequeued URLs never re-enter the queue either.
    assert!(!manager.add_url("https://example.com/a", 3));
    assert!(manager.get_next().is_none());
}

#[test]
fn get_next_skips_visited_entries() {
    let manager = LinkManager::new("example.com");
    manager.add_url("https://example.com/a", 1);
    manager.add_url("https://example.com/b", 1);
    manager.mark_visited("https://example.com/a");

    let entry = manager.get_next().unwrap();
    assert_eq!(entry.url, "https://example.com/b");
    assert!(manager.get_next().is_none());
}

#[test]
fn internal_classification_is_exact_host_match() {
    let manager = LinkManager::new("example.com");
    assert!(manager.is_internal("https://example.com/page"));
    assert!(!manager.is_internal("https://sub.example.com/page"));
    assert!(!manager.is_internal("https://other.com/page"));
}

#[test]
fn collect_links_dedups_and_classifies() {
    let manager = LinkManager::new("example.com");
    let source = Url::parse("https://example.com/start").unwrap();
    let doc = parsed(
        r#"<html><body>
            <a href="/about">About</a>
            <a href="/about">About again</a>
            <a href="https://other.com/x">Elsewhere</a>
            <nav><a href="/products">Products</a></nav>
            <footer><a href="/contact">Contact</a></footer>
        </body></html>"#,
    );

    let new_links = manager.collect_links(&doc, &source);
    assert_eq!(new_links.len(), 4, "duplicate edge should collapse");

    let links = manager.links_snapshot();
    let about = links
        .iter()
        .find(|l| l.target_url == "https://example.com/about")
        .unwrap();
    assert!(about.is_internal);
    assert_eq!(about.anchor_text, "About");
    assert_eq!(about.placement, LinkPlacement::Body);

    let products = links
        .iter()
        .find(|l| l.target_url == "https://example.com/products")
        .unwrap();
    assert_eq!(products.placement, LinkPlacement::Nav);

    let contact = links
        .iter()
        .find(|l| l.target_url == "https://example.com/contact")
        .unwrap();
    assert_eq!(contact.placement, LinkPlacement::Footer);

    let external = links
        .iter()
        .find(|l| l.target_url.starts_with("https://other.com"))
        .unwrap();
    assert!(!external.is_internal);
    assert_eq!(external.target_domain, "other.com");

    // Re-collecting the same page adds nothing.
    assert!(manager.collect_links(&doc, &source).is_empty());
}

#[test]
fn source_pages_track_internal_inbound_links() {
    let manager = LinkManager::new("example.com");
    let doc = parsed(r#"<a href="/target">t</a><a href="https://other.com/t">x</a>"#);

    let first = Url::parse("https://example.com/one").unwrap();
    let second = Url::parse("https://example.com/two").unwrap();
    manager.collect_links(&doc, &first);
    manager.collect_links(&doc, &second);

    let mut sources = manager.source_pages_of("https://example.com/target");
    sources.sort();
    assert_eq!(
        sources,
        vec!["https://example.com/one", "https://example.com/two"]
    );

    // External targets do not get inbound tracking.
    assert!(manager.source_pages_of("https://other.com/t").is_empty());
}

#[test]
fn extract_candidates_omits_discovered_urls() {
    let manager = LinkManager::new("example.com");
    manager.add_url("https://example.com/known", 0);

    let source = Url::parse("https://example.com/").unwrap();
    let doc = parsed(
        r#"<a href="/known">k</a><a href="/fresh">f</a><a href="/fresh#part">f2</a>"#,
    );

    let candidates = manager.extract_candidates(&doc, &source);
    assert_eq!(candidates, vec!["https://example.com/fresh"]);
}

#[test]
fn update_link_statuses_backfills_crawled_targets() {
    let manager = LinkManager::new("example.com");
    let source = Url::parse("https://example.com/").unwrap();
    let doc = parsed(r#"<a href="/a">a</a><a href="/missing">m</a>"#);
    manager.collect_links(&doc, &source);

    let record = PageRecord {
        url: "https://example.com/a".to_string(),
        status_code: 200,
        ..PageRecord::default()
    };
    manager.update_link_statuses(std::slice::from_ref(&record));

    let links = manager.links_snapshot();
    let a = links.iter().find(|l| l.target_url.ends_with("/a")).unwrap();
    assert_eq!(a.target_status, Some(200));
    let missing = links
        .iter()
        .find(|l| l.target_url.ends_with("/missing"))
        .unwrap();
    assert_eq!(missing.target_status, None);
}

#[test]
fn restore_queue_preserves_depth_and_disjointness() {
    let manager = LinkManager::new("example.com");
    manager.restore_queue(
        vec![
            QueueEntry {
                url: "https://example.com/pending".to_string(),
                depth: 2,
            },
            QueueEntry {
                url: "https://example.com/done".to_string(),
                depth: 1,
            },
        ],
        vec!["https://example.com/done".to_string()],
    );

    let entry = manager.get_next().unwrap();
    assert_eq!(entry.url, "https://example.com/pending");
    assert_eq!(entry.depth, 2);
    assert!(manager.get_next().is_none());

    // Restored entries count as discovered.
    assert!(!manager.add_url("https://example.com/pending", 1));
}
