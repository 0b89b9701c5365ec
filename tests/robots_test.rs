//! Robots cache decisions and caching behavior.

use crawlscope::RobotsCache;
use url::Url;

#[tokio::test]
async fn disallowed_paths_are_denied() {
    let mut server = mockito::Server::new_async().await;
    let robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /blocked\n")
        .expect(1)
        .create_async()
        .await;

    let cache = RobotsCache::new(reqwest::Client::new());
    let base = server.url();

    assert!(!cache.can_fetch("TestBot/1.0", &format!("{base}/blocked")).await);
    assert!(!cache.can_fetch("TestBot/1.0", &format!("{base}/blocked/deep")).await);
    assert!(cache.can_fetch("TestBot/1.0", &format!("{base}/open")).await);

    // Three decisions, one fetch.
    robots.assert_async().await;
}

#[tokio::test]
async fn fetch_failure_defaults_to_allow() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(500)
        .create_async()
        .await;

    let cache = RobotsCache::new(reqwest::Client::new());
    let url = format!("{}/anything", server.url());
    assert!(cache.can_fetch("TestBot/1.0", &url).await);
}

#[tokio::test]
async fn sitemap_directives_are_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body(format!(
            "User-agent: *\nAllow: /\nSitemap: {base}/map-a.xml\nsitemap: {base}/map-b.xml\n"
        ))
        .create_async()
        .await;

    let cache = RobotsCache::new(reqwest::Client::new());
    let base_url = Url::parse(&base).unwrap();
    let directives = cache.sitemap_directives(&base_url).await;
    assert_eq!(
        directives,
        vec![format!("{base}/map-a.xml"), format!("{base}/map-b.xml")]
    );
}

#[tokio::test]
async fn unparseable_urls_are_allowed() {
    let cache = RobotsCache::new(reqwest::Client::new());
    assert!(cache.can_fetch("TestBot/1.0", "not a url").await);
}
