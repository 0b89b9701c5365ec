//! Per-page issue rules, exclusion patterns and duplicate detection.

use crawlscope::issues::duplication::content_similarity;
use crawlscope::page_extractor::schema::{ImageRef, IssueSeverity, PageRecord};
use crawlscope::IssueDetector;

fn healthy_record(url: &str) -> PageRecord {
    PageRecord {
        url: url.to_string(),
        status_code: 200,
        title: "A perfectly reasonable page title for testing".to_string(),
        meta_description: "A description long enough to fall inside the recommended \
            window for meta descriptions, which needs more than a few words."
            .to_string(),
        h1: "Heading".to_string(),
        word_count: 500,
        canonical_url: url.to_string(),
        viewport: "width=device-width".to_string(),
        lang: "en".to_string(),
        og_tags: [("og:title".to_string(), "t".to_string())].into(),
        twitter_tags: [("twitter:card".to_string(), "summary".to_string())].into(),
        json_ld: vec![serde_json::json!({"@type": "WebPage"})],
        response_time_ms: 200,
        size: 10_000,
        ..PageRecord::default()
    }
}

fn issues_named(detector: &IssueDetector, record: &PageRecord) -> Vec<String> {
    detector
        .detect(record)
        .into_iter()
        .map(|i| i.issue)
        .collect()
}

#[test]
fn healthy_page_raises_nothing() {
    let detector = IssueDetector::new(&[]);
    assert!(issues_named(&detector, &healthy_record("https://a.test/ok")).is_empty());
}

#[test]
fn title_rules() {
    let detector = IssueDetector::new(&[]);

    let mut record = healthy_record("https://a.test/1");
    record.title.clear();
    assert!(issues_named(&detector, &record).contains(&"Missing Title Tag".to_string()));

    let mut record = healthy_record("https://a.test/2");
    record.title = "x".repeat(61);
    assert!(issues_named(&detector, &record).contains(&"Title Too Long".to_string()));

    let mut record = healthy_record("https://a.test/3");
    record.title = "short".to_string();
    assert!(issues_named(&detector, &record).contains(&"Title Too Short".to_string()));
}

#[test]
fn meta_description_rules() {
    let detector = IssueDetector::new(&[]);

    let mut record = healthy_record("https://a.test/1");
    record.meta_description.clear();
    let named = issues_named(&detector, &record);
    assert!(named.contains(&"Missing Meta Description".to_string()));

    let mut record = healthy_record("https://a.test/2");
    record.meta_description = "y".repeat(161);
    assert!(issues_named(&detector, &record).contains(&"Meta Description Too Long".to_string()));

    let mut record = healthy_record("https://a.test/3");
    record.meta_description = "too short".to_string();
    assert!(issues_named(&detector, &record).contains(&"Meta Description Too Short".to_string()));
}

#[test]
fn status_code_rules() {
    let detector = IssueDetector::new(&[]);

    let mut record = healthy_record("https://a.test/404");
    record.status_code = 404;
    let issues = detector.detect(&record);
    let not_found = issues.iter().find(|i| i.issue == "404 Client Error").unwrap();
    assert_eq!(not_found.severity, IssueSeverity::Error);
    assert_eq!(not_found.details, "Not Found");

    let mut record = healthy_record("https://a.test/500");
    record.status_code = 503;
    assert!(issues_named(&detector, &record).contains(&"503 Server Error".to_string()));

    let mut record = healthy_record("https://a.test/301");
    record.status_code = 301;
    let issues = detector.detect(&record);
    let redirect = issues.iter().find(|i| i.issue == "301 Redirect").unwrap();
    assert_eq!(redirect.severity, IssueSeverity::Info);
}

#[test]
fn canonical_and_mobile_and_accessibility_rules() {
    let detector = IssueDetector::new(&[]);

    let mut record = healthy_record("https://a.test/c");
    record.canonical_url = "https://a.test/elsewhere".to_string();
    assert!(issues_named(&detector, &record).contains(&"Canonical URL Different".to_string()));

    let mut record = healthy_record("https://a.test/v");
    record.viewport.clear();
    record.lang.clear();
    let named = issues_named(&detector, &record);
    assert!(named.contains(&"Missing Viewport Meta Tag".to_string()));
    assert!(named.contains(&"Missing Language Attribute".to_string()));

    let mut record = healthy_record("https://a.test/img");
    record.images = vec![
        ImageRef {
            src: "https://a.test/1.png".to_string(),
            alt: "ok".to_string(),
        },
        ImageRef {
            src: "https://a.test/2.png".to_string(),
            alt: String::new(),
        },
    ];
    let issues = detector.detect(&record);
    let alt = issues
        .iter()
        .find(|i| i.issue == "Images Without Alt Text")
        .unwrap();
    assert!(alt.details.contains("1 of 2"));
}

#[test]
fn performance_and_indexability_rules() {
    let detector = IssueDetector::new(&[]);

    let mut record = healthy_record("https://a.test/slow");
    record.response_time_ms = 3500;
    assert!(issues_named(&detector, &record).contains(&"Slow Response Time".to_string()));

    let mut record = healthy_record("https://a.test/slowish");
    record.response_time_ms = 1500;
    assert!(issues_named(&detector, &record).contains(&"Moderate Response Time".to_string()));

    // Rendered pages are exempt from response-time thresholds.
    let mut record = healthy_record("https://a.test/js");
    record.response_time_ms = 5000;
    record.javascript_rendered = true;
    assert!(!issues_named(&detector, &record)
        .iter()
        .any(|i| i.contains("Response Time")));

    let mut record = healthy_record("https://a.test/big");
    record.size = 4 * 1024 * 1024;
    assert!(issues_named(&detector, &record).contains(&"Large Page Size".to_string()));

    let mut record = healthy_record("https://a.test/robots");
    record.robots = "noindex, nofollow".to_string();
    let named = issues_named(&detector, &record);
    assert!(named.contains(&"Noindex Tag Present".to_string()));
    assert!(named.contains(&"Nofollow Tag Present".to_string()));
}

#[test]
fn thin_content_and_structured_data_rules() {
    let detector = IssueDetector::new(&[]);

    let mut record = healthy_record("https://a.test/thin");
    record.word_count = 120;
    assert!(issues_named(&detector, &record).contains(&"Thin Content".to_string()));

    let mut record = healthy_record("https://a.test/nosd");
    record.json_ld.clear();
    record.schema_org.clear();
    assert!(issues_named(&detector, &record).contains(&"No Structured Data".to_string()));
}

#[test]
fn excluded_paths_produce_zero_issues() {
    let patterns = vec![
        "# comment line".to_string(),
        "/wp-admin/*".to_string(),
        "*.json".to_string(),
        "/private".to_string(),
    ];
    let detector = IssueDetector::new(&patterns);

    // A record this broken would raise many issues if not excluded.
    let mut record = PageRecord {
        url: "https://a.test/wp-admin/options.php".to_string(),
        status_code: 500,
        ..PageRecord::default()
    };
    assert!(detector.detect(&record).is_empty());

    record.url = "https://a.test/data/feed.json".to_string();
    assert!(detector.detect(&record).is_empty());

    // Plain patterns are prefix matches.
    record.url = "https://a.test/private/notes".to_string();
    assert!(detector.detect(&record).is_empty());

    record.url = "https://a.test/public".to_string();
    assert!(!detector.detect(&record).is_empty());
    assert_eq!(detector.issue_count(), detector.issues().len());
}

#[test]
fn identical_pages_flag_each_other() {
    let detector = IssueDetector::new(&[]);
    let make = |url: &str, words: usize| PageRecord {
        url: url.to_string(),
        title: "Home".to_string(),
        meta_description: "Welcome".to_string(),
        h1: "Hello".to_string(),
        word_count: words,
        ..PageRecord::default()
    };

    let records = vec![
        make("https://a.test/one", 500),
        make("https://a.test/two", 520),
    ];
    let issues = detector.detect_duplicates(&records, 0.85);
    assert_eq!(issues.len(), 2);
    assert!(issues.iter().all(|i| i.issue == "Duplicate Content Detected"));

    let first = &issues[0];
    assert_eq!(first.url, "https://a.test/one");
    assert!(first.details.contains("https://a.test/two"));

    // Reported similarity is at least 95%.
    let sim = content_similarity(&records[0], &records[1]);
    assert!(sim >= 0.95, "similarity was {sim}");
    assert!(first.details.contains('%'));
}

#[test]
fn distinct_pages_are_not_flagged() {
    let detector = IssueDetector::new(&[]);
    let a = PageRecord {
        url: "https://a.test/a".to_string(),
        title: "Completely different subject".to_string(),
        meta_description: "About apples and orchards".to_string(),
        h1: "Apples".to_string(),
        word_count: 900,
        ..PageRecord::default()
    };
    let b = PageRecord {
        url: "https://a.test/b".to_string(),
        title: "zzz qqq xxx".to_string(),
        meta_description: "vvv www uuu".to_string(),
        h1: "kkk".to_string(),
        word_count: 0,
        ..PageRecord::default()
    };
    assert!(detector.detect_duplicates(&[a, b], 0.85).is_empty());
}

#[test]
fn excluded_urls_do_not_join_duplicate_pairs() {
    let detector = IssueDetector::new(&["/hidden/*".to_string()]);
    let make = |url: &str| PageRecord {
        url: url.to_string(),
        title: "Home".to_string(),
        meta_description: "Welcome".to_string(),
        h1: "Hello".to_string(),
        word_count: 500,
        ..PageRecord::default()
    };

    let records = vec![
        make("https://a.test/hidden/page"),
        make("https://a.test/visible"),
    ];
    assert!(detector.detect_duplicates(&records, 0.85).is_empty());
}
