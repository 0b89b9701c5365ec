//! Sitemap discovery and parsing.
//!
//! Probes the conventional sitemap locations plus any `Sitemap:` directives
//! from robots.txt, follows `<sitemapindex>` documents breadth-first, and
//! returns a deduplicated URL list. One broken sitemap never aborts the
//! others.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Nesting bound for sitemap index files.
const MAX_INDEX_DEPTH: usize = 3;
/// Total sitemap documents fetched per discovery pass.
const MAX_SITEMAP_FILES: usize = 50;

/// Discovers page URLs from a site's sitemaps.
pub struct SitemapParser {
    client: reqwest::Client,
}

enum SitemapDoc {
    /// A `<sitemapindex>` whose `<loc>` entries are further sitemaps.
    Index(Vec<String>),
    /// A `<urlset>` whose `<loc>` entries are page URLs.
    UrlSet(Vec<String>),
}

impl SitemapParser {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Probe `/sitemap.xml`, `/sitemap_index.xml` and every robots.txt
    /// `Sitemap:` directive, returning page URLs in first-seen order.
    pub async fn discover(&self, base_url: &Url, robots_sitemaps: &[String]) -> Vec<String> {
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        for probe in ["/sitemap.xml", "/sitemap_index.xml"] {
            if let Ok(url) = base_url.join(probe) {
                queue.push_back((url.to_string(), 0));
            }
        }
        for directive in robots_sitemaps {
            queue.push_back((directive.clone(), 0));
        }

        let mut seen_files: HashSet<String> = HashSet::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut urls = Vec::new();
        let mut fetched = 0usize;

        while let Some((sitemap_url, depth)) = queue.pop_front() {
            if depth > MAX_INDEX_DEPTH || fetched >= MAX_SITEMAP_FILES {
                continue;
            }
            if !seen_files.insert(sitemap_url.clone()) {
                continue;
            }

            let Some(text) = self.fetch_text(&sitemap_url).await else {
                continue;
            };
            fetched += 1;

            match parse_sitemap_document(&text) {
                SitemapDoc::Index(children) => {
                    log::debug!(
                        "sitemap index {sitemap_url} lists {} child sitemaps",
                        children.len()
                    );
                    for child in children {
                        queue.push_back((child, depth + 1));
                    }
                }
                SitemapDoc::UrlSet(locs) => {
                    for loc in locs {
                        if seen_urls.insert(loc.clone()) {
                            urls.push(loc);
                        }
                    }
                }
            }
        }

        log::info!(
            "sitemap discovery found {} URLs across {fetched} files",
            urls.len()
        );
        urls
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                log::debug!("sitemap {url} returned {}", resp.status());
                None
            }
            Err(e) => {
                log::debug!("sitemap fetch failed for {url}: {e}");
                None
            }
        }
    }
}

/// Pull `<loc>` values out of a sitemap document, classifying it as an
/// index or a urlset by its root element.
fn parse_sitemap_document(text: &str) -> SitemapDoc {
    let mut reader = Reader::from_str(text);
    let mut buf = Vec::new();
    let mut locs = Vec::new();
    let mut is_index = false;
    let mut in_loc = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(e)) if in_loc => {
                if let Ok(text) = e.decode() {
                    let loc = text.trim().to_string();
                    if !loc.is_empty() {
                        locs.push(loc);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::debug!("sitemap parse error at byte {}: {e}", reader.buffer_position());
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    if is_index {
        SitemapDoc::Index(locs)
    } else {
        SitemapDoc::UrlSet(locs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_locs() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/</loc></url>
              <url><loc>https://example.com/about</loc></url>
            </urlset>"#;
        match parse_sitemap_document(xml) {
            SitemapDoc::UrlSet(locs) => {
                assert_eq!(locs, vec!["https://example.com/", "https://example.com/about"]);
            }
            SitemapDoc::Index(_) => panic!("expected urlset"),
        }
    }

    #[test]
    fn classifies_sitemap_index() {
        let xml = r#"<sitemapindex>
              <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
            </sitemapindex>"#;
        match parse_sitemap_document(xml) {
            SitemapDoc::Index(locs) => assert_eq!(locs.len(), 1),
            SitemapDoc::UrlSet(_) => panic!("expected index"),
        }
    }

    #[test]
    fn tolerates_garbage() {
        match parse_sitemap_document("this is not xml at all") {
            SitemapDoc::UrlSet(locs) => assert!(locs.is_empty()),
            SitemapDoc::Index(_) => panic!("expected empty urlset"),
        }
    }
}
