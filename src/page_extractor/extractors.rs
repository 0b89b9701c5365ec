//! SEO data extraction over a parsed document.
//!
//! Every function here is pure: it reads the document and writes fields on
//! the caller's [`PageRecord`], never touching shared state. Parsing and
//! extraction are synchronous because `scraper` documents are not `Send`;
//! callers must not hold a document across an await point.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::schema::{HreflangEntry, ImageRef, PageRecord};
use crate::utils::url_utils;

static TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static H1: Lazy<Selector> = Lazy::new(|| sel("h1"));
static H2: Lazy<Selector> = Lazy::new(|| sel("h2"));
static H3: Lazy<Selector> = Lazy::new(|| sel("h3"));
static BODY: Lazy<Selector> = Lazy::new(|| sel("body"));
static META: Lazy<Selector> = Lazy::new(|| sel("meta"));
static META_CHARSET: Lazy<Selector> = Lazy::new(|| sel("meta[charset]"));
static CANONICAL: Lazy<Selector> = Lazy::new(|| sel(r#"link[rel="canonical"]"#));
static JSON_LD: Lazy<Selector> = Lazy::new(|| sel(r#"script[type="application/ld+json"]"#));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static HREFLANG: Lazy<Selector> = Lazy::new(|| sel("link[hreflang]"));
static ITEMTYPE: Lazy<Selector> = Lazy::new(|| sel("[itemtype]"));

static GA4_ID: Lazy<Regex> = Lazy::new(|| re(r"G-\w+"));
static GTM_ID: Lazy<Regex> = Lazy::new(|| re(r"GTM-\w+"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

/// Fill all SEO fields of `record` from a parsed document.
///
/// `raw_body` is the undecoded response text, used for analytics substring
/// detection that also has to catch identifiers living outside the DOM
/// (inline script bodies, comments).
pub fn populate_seo_fields(
    record: &mut PageRecord,
    doc: &Html,
    base_url: &Url,
    raw_body: &str,
    base_domain: &str,
) {
    extract_basic(record, doc, base_url);
    extract_meta_tags(record, doc);
    extract_social_tags(record, doc);
    extract_json_ld(record, doc);
    extract_analytics(record, raw_body);
    extract_images(record, doc, base_url);
    extract_link_counts(record, doc, base_url, base_domain);
    extract_hreflang(record, doc, base_url);
    extract_schema_org(record, doc);
}

fn extract_basic(record: &mut PageRecord, doc: &Html, base_url: &Url) {
    record.title = doc
        .select(&TITLE)
        .map(|el| collapse_whitespace(&element_text(el)))
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    record.h1 = doc
        .select(&H1)
        .next()
        .map(|el| collapse_whitespace(&element_text(el)))
        .unwrap_or_default();
    record.h2 = doc
        .select(&H2)
        .map(|el| collapse_whitespace(&element_text(el)))
        .collect();
    record.h3 = doc
        .select(&H3)
        .map(|el| collapse_whitespace(&element_text(el)))
        .collect();

    record.word_count = word_count(doc);

    if let Some(el) = doc.select(&CANONICAL).next()
        && let Some(href) = el.value().attr("href")
        && let Ok(resolved) = base_url.join(href)
    {
        record.canonical_url = resolved.to_string();
    }

    record.lang = doc
        .root_element()
        .value()
        .attr("lang")
        .unwrap_or_default()
        .to_string();

    record.charset = doc
        .select(&META_CHARSET)
        .next()
        .and_then(|el| el.value().attr("charset"))
        .map(str::to_lowercase)
        .unwrap_or_else(|| charset_from_http_equiv(doc));
}

/// Collect `<meta name=...>` pairs and lift the well-known ones into their
/// dedicated record fields.
fn extract_meta_tags(record: &mut PageRecord, doc: &Html) {
    for el in doc.select(&META) {
        let Some(name) = el.value().attr("name") else {
            continue;
        };
        let content = el.value().attr("content").unwrap_or_default().to_string();
        let key = name.to_lowercase();

        match key.as_str() {
            "description" => record.meta_description = content.clone(),
            "viewport" => record.viewport = content.clone(),
            "robots" => record.robots = content.clone(),
            "author" => record.author = content.clone(),
            "keywords" => record.keywords = content.clone(),
            "generator" => record.generator = content.clone(),
            "theme-color" => record.theme_color = content.clone(),
            _ => {}
        }

        record.meta_tags.insert(key, content);
    }
}

/// OpenGraph tags keyed by `property`, Twitter Card tags keyed by either
/// `name` or `property`.
fn extract_social_tags(record: &mut PageRecord, doc: &Html) {
    for el in doc.select(&META) {
        let content = el.value().attr("content").unwrap_or_default();

        if let Some(property) = el.value().attr("property")
            && property.starts_with("og:")
        {
            record
                .og_tags
                .insert(property.to_string(), content.to_string());
        }

        let twitter_key = el
            .value()
            .attr("name")
            .or_else(|| el.value().attr("property"))
            .filter(|k| k.starts_with("twitter:"));
        if let Some(key) = twitter_key {
            record
                .twitter_tags
                .insert(key.to_string(), content.to_string());
        }
    }
}

fn extract_json_ld(record: &mut PageRecord, doc: &Html) {
    for el in doc.select(&JSON_LD) {
        let raw = element_text(el);
        // Malformed blocks are skipped, not fatal.
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => record.json_ld.push(value),
            Err(e) => log::debug!("skipping malformed JSON-LD block: {e}"),
        }
    }
}

fn extract_analytics(record: &mut PageRecord, raw_body: &str) {
    let analytics = &mut record.analytics;

    analytics.gtag = raw_body.contains("gtag(");
    if let Some(m) = GA4_ID.find(raw_body) {
        analytics.ga4_id = m.as_str().to_string();
    }
    analytics.google_analytics = analytics.gtag
        || !analytics.ga4_id.is_empty()
        || raw_body.contains("google-analytics.com")
        || raw_body.contains("googletagmanager.com/gtag/js");

    if let Some(m) = GTM_ID.find(raw_body) {
        analytics.gtm_id = m.as_str().to_string();
    }
    analytics.google_tag_manager =
        !analytics.gtm_id.is_empty() || raw_body.contains("googletagmanager.com/gtm.js");

    analytics.facebook_pixel =
        raw_body.contains("connect.facebook.net") || raw_body.contains("fbq(");
    analytics.hotjar = raw_body.contains("hotjar");
    analytics.mixpanel = raw_body.contains("mixpanel");
}

fn extract_images(record: &mut PageRecord, doc: &Html, base_url: &Url) {
    for el in doc.select(&IMG) {
        let Some(src) = el.value().attr("src") else {
            continue;
        };
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let Ok(resolved) = base_url.join(src) else {
            continue;
        };
        record.images.push(ImageRef {
            src: resolved.to_string(),
            alt: el.value().attr("alt").unwrap_or_default().trim().to_string(),
        });
    }
}

/// Count anchors after normalization, classified against the crawl's base
/// domain (exact host match, subdomain-sensitive).
fn extract_link_counts(record: &mut PageRecord, doc: &Html, base_url: &Url, base_domain: &str) {
    for el in doc.select(&ANCHOR) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(target) = resolve_href(base_url, href) else {
            continue;
        };
        if url_utils::domain_of(&target).as_deref() == Some(base_domain) {
            record.internal_links += 1;
        } else {
            record.external_links += 1;
        }
    }
}

fn extract_hreflang(record: &mut PageRecord, doc: &Html, base_url: &Url) {
    for el in doc.select(&HREFLANG) {
        let rel = el.value().attr("rel").unwrap_or_default();
        if !rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")) {
            continue;
        }
        let Some(lang) = el.value().attr("hreflang") else {
            continue;
        };
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        record.hreflang.push(HreflangEntry {
            lang: lang.to_string(),
            href: resolved.to_string(),
        });
    }
}

fn extract_schema_org(record: &mut PageRecord, doc: &Html) {
    for el in doc.select(&ITEMTYPE) {
        if let Some(itemtype) = el.value().attr("itemtype") {
            record.schema_org.push(itemtype.to_string());
        }
    }
}

/// Resolve an anchor href against the page URL and normalize it.
/// Returns `None` for fragments-only links and non-http targets.
#[must_use]
pub fn resolve_href(base_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = base_url.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    url_utils::normalize_url(resolved.as_str())
}

/// Whitespace-delimited token count of the body text, with `<script>` and
/// `<style>` subtrees removed.
fn word_count(doc: &Html) -> usize {
    let mut text = String::new();
    if let Some(body) = doc.select(&BODY).next() {
        collect_visible_text(body, &mut text);
    }
    text.split_whitespace().count()
}

fn collect_visible_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if name != "script" && name != "style" {
                collect_visible_text(child_el, out);
            }
        }
    }
}

fn charset_from_http_equiv(doc: &Html) -> String {
    for el in doc.select(&META) {
        let http_equiv = el.value().attr("http-equiv").unwrap_or_default();
        if http_equiv.eq_ignore_ascii_case("content-type")
            && let Some(content) = el.value().attr("content")
            && let Some((_, charset)) = content.split_once("charset=")
        {
            return charset.trim().to_lowercase();
        }
    }
    String::new()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
