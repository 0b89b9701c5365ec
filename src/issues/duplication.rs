//! Cross-page near-duplicate detection.
//!
//! Runs once after all per-page extraction is done. Each unordered pair of
//! records is scored with a weighted similarity over title, description, h1
//! and word count; pairs at or above the threshold produce a warning on
//! both URLs.

use crate::page_extractor::schema::{IssueRecord, IssueSeverity, PageRecord};

use super::IssueDetector;

const TITLE_WEIGHT: f64 = 0.35;
const DESC_WEIGHT: f64 = 0.35;
const H1_WEIGHT: f64 = 0.20;
const WORD_COUNT_WEIGHT: f64 = 0.10;

impl IssueDetector {
    /// Compare every unordered record pair and flag near-duplicates.
    /// Excluded URLs participate in neither side of a pair. Returns the
    /// newly raised issues (also retained internally).
    pub fn detect_duplicates(
        &self,
        results: &[PageRecord],
        threshold: f64,
    ) -> Vec<IssueRecord> {
        let mut issues = Vec::new();

        let candidates: Vec<&PageRecord> = results
            .iter()
            .filter(|r| !self.should_exclude(&r.url))
            .collect();

        for (i, first) in candidates.iter().enumerate() {
            for second in candidates.iter().skip(i + 1) {
                let similarity = content_similarity(first, second);
                if similarity < threshold {
                    continue;
                }

                let pct = similarity * 100.0;
                issues.push(duplicate_issue(&first.url, &second.url, pct));
                issues.push(duplicate_issue(&second.url, &first.url, pct));
            }
        }

        self.push_all(issues.clone());
        issues
    }
}

fn duplicate_issue(url: &str, other: &str, pct: f64) -> IssueRecord {
    IssueRecord {
        url: url.to_string(),
        severity: IssueSeverity::Warning,
        category: "Duplication".to_string(),
        issue: "Duplicate Content Detected".to_string(),
        details: format!("Content is {pct:.1}% similar to {other}"),
    }
}

/// Weighted similarity between two records, in `0.0..=1.0`.
///
/// Title and description carry most of the weight; word counts contribute
/// their min/max ratio. A field empty on either side scores 0 for that
/// component.
#[must_use]
pub fn content_similarity(first: &PageRecord, second: &PageRecord) -> f64 {
    let title_sim = field_similarity(&first.title, &second.title);
    let desc_sim = field_similarity(&first.meta_description, &second.meta_description);
    let h1_sim = field_similarity(&first.h1, &second.h1);

    let word_count_sim = if first.word_count > 0 && second.word_count > 0 {
        let max = first.word_count.max(second.word_count) as f64;
        let min = first.word_count.min(second.word_count) as f64;
        min / max
    } else {
        0.0
    };

    title_sim * TITLE_WEIGHT
        + desc_sim * DESC_WEIGHT
        + h1_sim * H1_WEIGHT
        + word_count_sim * WORD_COUNT_WEIGHT
}

fn field_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    sequence_ratio(&a, &b)
}

/// Similarity ratio `2·LCS / (|a| + |b|)` over characters, in `0.0..=1.0`.
/// Equal strings score 1.0; strings with no characters in common score 0.
#[must_use]
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let lcs = lcs_length(&a_chars, &b_chars);

    (2.0 * lcs as f64) / (a_chars.len() + b_chars.len()) as f64
}

/// Longest-common-subsequence length with a rolling single-row table.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                current[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}
