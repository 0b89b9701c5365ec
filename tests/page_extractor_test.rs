//! SEO extraction over a representative fixture document.

use crawlscope::PageRecord;
use crawlscope::page_extractor::populate_seo_fields;
use scraper::Html;
use url::Url;

const FIXTURE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>  Acme Widgets — Quality Widgets Since 1912  </title>
    <meta name="description" content="Buy the finest widgets.">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="robots" content="index, follow">
    <meta name="author" content="Acme Inc">
    <meta name="keywords" content="widgets, acme">
    <meta name="generator" content="WidgetCMS 4.2">
    <meta name="theme-color" content="#663399">
    <meta property="og:title" content="Acme Widgets">
    <meta property="og:type" content="website">
    <meta name="twitter:card" content="summary">
    <link rel="canonical" href="/widgets">
    <link rel="alternate" hreflang="de" href="/de/widgets">
    <script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
    <script type="application/ld+json">{not valid json</script>
    <script>gtag('config', 'G-ABC123XYZ');</script>
</head>
<body itemscope itemtype="https://schema.org/WebPage">
    <h1>Widgets</h1>
    <h2>Premium</h2>
    <h2>Budget</h2>
    <h3>Details</h3>
    <p>one two three four five</p>
    <script>var ignored = "six seven eight";</script>
    <style>.hidden { display: none; }</style>
    <img src="/img/widget.png" alt="A widget">
    <img src="/img/other.png">
    <img src="data:image/gif;base64,R0lGOD">
    <a href="/widgets/premium">Premium</a>
    <a href="https://partner.example.net/offer">Partner</a>
</body>
</html>"##;

fn extract() -> PageRecord {
    let doc = Html::parse_document(FIXTURE);
    let base = Url::parse("https://acme.test/widgets").unwrap();
    let mut record = PageRecord {
        url: base.to_string(),
        ..PageRecord::default()
    };
    populate_seo_fields(&mut record, &doc, &base, FIXTURE, "acme.test");
    record
}

#[test]
fn basic_fields() {
    let record = extract();
    assert_eq!(record.title, "Acme Widgets — Quality Widgets Since 1912");
    assert_eq!(record.meta_description, "Buy the finest widgets.");
    assert_eq!(record.h1, "Widgets");
    assert_eq!(record.h2, vec!["Premium", "Budget"]);
    assert_eq!(record.h3, vec!["Details"]);
    assert_eq!(record.lang, "en");
    assert_eq!(record.charset, "utf-8");
    assert_eq!(record.viewport, "width=device-width, initial-scale=1");
    assert_eq!(record.robots, "index, follow");
    assert_eq!(record.author, "Acme Inc");
    assert_eq!(record.keywords, "widgets, acme");
    assert_eq!(record.generator, "WidgetCMS 4.2");
    assert_eq!(record.theme_color, "#663399");
    assert_eq!(record.canonical_url, "https://acme.test/widgets");
}

#[test]
fn word_count_ignores_script_and_style() {
    let record = extract();
    // Body text: h1 + 2×h2 + h3 + paragraph + anchor texts; the script
    // and style contents must not contribute.
    assert!(record.word_count >= 9);
    assert!(record.word_count <= 12, "word_count was {}", record.word_count);
}

#[test]
fn social_and_structured_data() {
    let record = extract();
    assert_eq!(record.og_tags.get("og:title").unwrap(), "Acme Widgets");
    assert_eq!(record.og_tags.get("og:type").unwrap(), "website");
    assert_eq!(record.twitter_tags.get("twitter:card").unwrap(), "summary");

    // One valid JSON-LD block survives; the malformed one is skipped.
    assert_eq!(record.json_ld.len(), 1);
    assert_eq!(record.json_ld[0]["name"], "Acme");

    assert_eq!(record.schema_org, vec!["https://schema.org/WebPage"]);
    assert_eq!(
        record.hreflang[0].href,
        "https://acme.test/de/widgets"
    );
    assert_eq!(record.hreflang[0].lang, "de");
}

#[test]
fn analytics_detection() {
    let record = extract();
    assert!(record.analytics.gtag);
    assert!(record.analytics.google_analytics);
    assert_eq!(record.analytics.ga4_id, "G-ABC123XYZ");
    assert!(!record.analytics.facebook_pixel);
    assert!(!record.analytics.hotjar);
    assert!(!record.analytics.mixpanel);
    assert!(record.analytics.gtm_id.is_empty());
}

#[test]
fn images_resolved_with_alt() {
    let record = extract();
    // data: URI is skipped.
    assert_eq!(record.images.len(), 2);
    assert_eq!(record.images[0].src, "https://acme.test/img/widget.png");
    assert_eq!(record.images[0].alt, "A widget");
    assert_eq!(record.images[1].alt, "");
}

#[test]
fn link_counts_classify_by_exact_host() {
    let record = extract();
    assert_eq!(record.internal_links, 1);
    assert_eq!(record.external_links, 1);
}

#[test]
fn missing_everything_yields_empty_fields() {
    let doc = Html::parse_document("<html><body><p>bare page</p></body></html>");
    let base = Url::parse("https://acme.test/").unwrap();
    let mut record = PageRecord::default();
    populate_seo_fields(&mut record, &doc, &base, "", "acme.test");

    assert!(record.title.is_empty());
    assert!(record.meta_description.is_empty());
    assert!(record.h1.is_empty());
    assert!(record.canonical_url.is_empty());
    assert!(record.og_tags.is_empty());
    assert!(record.json_ld.is_empty());
    assert_eq!(record.word_count, 2);
}
