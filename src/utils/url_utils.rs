//! URL validation, normalization and domain helpers.
//!
//! All queue membership and dedup decisions in the engine go through
//! [`normalize_url`], so normalization must be idempotent: applying it to
//! its own output yields the same string.

use url::Url;

/// Check if a URL is crawlable at all.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    // Skip data URLs, javascript URLs, and other non-http schemes
    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:")
        || url.starts_with("tel:")
    {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Normalize a URL into its canonical queue form.
///
/// Strips the fragment, drops default ports, decodes percent-escapes that
/// cover unreserved ASCII, removes `/./` segments and collapses duplicate
/// slashes in the path. A bare hostname gets an `https://` scheme.
/// Returns `None` for URLs that cannot be crawled.
#[must_use]
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if raw.contains("://") || raw.starts_with("data:") || raw.starts_with("javascript:")
        || raw.starts_with("mailto:") || raw.starts_with("tel:")
    {
        return None;
    } else {
        format!("https://{raw}")
    };

    let mut url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;

    // The url crate already lowercases the host and drops default ports.
    url.set_fragment(None);

    let path = normalize_path(url.path());
    url.set_path(&path);

    Some(url.to_string())
}

/// Host (plus any non-default port) of a URL, the engine's notion of domain.
#[must_use]
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Domain string for an already-parsed URL.
#[must_use]
pub fn domain_of_parsed(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Lowercased extension of the URL path, if any.
#[must_use]
pub fn path_extension(url: &Url) -> Option<String> {
    let path = url.path();
    let last_segment = path.rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

fn normalize_path(path: &str) -> String {
    let decoded = decode_unreserved_escapes(path);

    // Dropping empty segments collapses duplicate slashes; "." segments
    // are no-ops in a hierarchical path.
    let segments: Vec<&str> = decoded
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let mut out = String::with_capacity(decoded.len());
    out.push('/');
    out.push_str(&segments.join("/"));
    if decoded.ends_with('/') && out.len() > 1 {
        out.push('/');
    }
    out
}

/// Decode `%XX` escapes whose byte is unreserved ASCII (RFC 3986 §2.3).
/// Reserved and non-ASCII escapes are left untouched so decoding cannot
/// change the meaning of the path.
fn decode_unreserved_escapes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '%' && i + 2 < chars.len() {
            if let (Some(hi), Some(lo)) = (chars[i + 1].to_digit(16), chars[i + 2].to_digit(16)) {
                let byte = (hi * 16 + lo) as u8;
                if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
                    out.push(byte as char);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_default_port() {
        assert_eq!(
            normalize_url("https://example.com:443/page#section"),
            Some("https://example.com/page".to_string())
        );
        assert_eq!(
            normalize_url("http://example.com:80/"),
            Some("http://example.com/".to_string())
        );
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(
            normalize_url("http://example.com:8080/a"),
            Some("http://example.com:8080/a".to_string())
        );
    }

    #[test]
    fn collapses_path_noise() {
        assert_eq!(
            normalize_url("https://example.com/a//b/./c"),
            Some("https://example.com/a/b/c".to_string())
        );
    }

    #[test]
    fn decodes_unreserved_escapes_only() {
        assert_eq!(
            normalize_url("https://example.com/%61bc/%2Fkeep"),
            Some("https://example.com/abc/%2Fkeep".to_string())
        );
    }

    #[test]
    fn adds_scheme_to_bare_host() {
        assert_eq!(
            normalize_url("example.com/page"),
            Some("https://example.com/page".to_string())
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert_eq!(normalize_url("mailto:x@example.com"), None);
        assert_eq!(normalize_url("javascript:void(0)"), None);
        assert!(!is_valid_url("data:text/plain,hi"));
    }

    #[test]
    fn extension_extraction() {
        let url = Url::parse("https://example.com/docs/report.PDF").unwrap();
        assert_eq!(path_extension(&url), Some("pdf".to_string()));
        let url = Url::parse("https://example.com/docs/").unwrap();
        assert_eq!(path_extension(&url), None);
    }
}
