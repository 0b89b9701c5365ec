//! URL normalization properties.

use crawlscope::LinkManager;
use crawlscope::utils::normalize_url;
use proptest::prelude::*;

proptest! {
    #[test]
    fn normalization_is_idempotent(
        host in "[a-z]{1,10}(\\.[a-z]{2,3})?",
        path in "(/[a-zA-Z0-9._~%/-]{0,16}){0,3}",
        fragment in "[a-z]{0,6}",
    ) {
        let url = format!("https://{host}{path}#{fragment}");
        if let Some(once) = normalize_url(&url) {
            let twice = normalize_url(&once);
            prop_assert_eq!(Some(once), twice);
        }
    }

    #[test]
    fn normalized_urls_have_no_fragment(
        host in "[a-z]{1,10}\\.[a-z]{2,3}",
        fragment in "[a-z]{1,6}",
    ) {
        let url = format!("https://{host}/page#{fragment}");
        let normalized = normalize_url(&url).unwrap();
        prop_assert!(!normalized.contains('#'));
    }
}

#[test]
fn fragment_variants_collapse_to_one_queue_entry() {
    let manager = LinkManager::new("example.com");
    assert!(manager.add_url("https://example.com/page", 1));
    assert!(!manager.add_url("https://example.com/page#top", 1));
    assert!(!manager.add_url("https://example.com/page#section-2", 1));

    assert_eq!(manager.stats().discovered, 1);
    assert_eq!(manager.stats().pending, 1);
}

#[test]
fn default_port_variants_collapse() {
    let manager = LinkManager::new("example.com");
    assert!(manager.add_url("https://example.com:443/page", 1));
    assert!(!manager.add_url("https://example.com/page", 1));
    assert_eq!(manager.stats().discovered, 1);
}
