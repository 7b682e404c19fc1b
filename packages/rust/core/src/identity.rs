//! Normalization of the strings reporters are keyed and matched on.
//!
//! Every key produced here is lowercase and trimmed, so comparisons are
//! case-insensitive by construction. An empty key means "no identity".

use url::Url;

/// Byline prefixes that are not part of the author's name.
const BYLINE_PREFIXES: &[&str] = &["por ", "by ", "por:", "by:"];

/// Clean a raw byline for display: drop a leading "Por"/"By", non-breaking
/// spaces, and runs of whitespace.
pub fn clean_byline(raw: &str) -> String {
    let collapsed = raw
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let lower = collapsed.to_lowercase();
    for prefix in BYLINE_PREFIXES {
        if lower.starts_with(prefix) && collapsed.is_char_boundary(prefix.len()) {
            return collapsed[prefix.len()..].trim().to_string();
        }
    }
    collapsed
}

/// Grouping and matching key for a display name.
pub fn name_key(name: &str) -> String {
    clean_byline(name).to_lowercase()
}

/// Grouping key for a profile URL: scheme and `www.` dropped, query and
/// fragment removed, trailing slashes stripped.
pub fn url_key(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match Url::parse(raw) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("").trim_start_matches("www.");
            let path = url.path().trim_end_matches('/');
            format!("{host}{path}").to_lowercase()
        }
        Err(_) => raw.trim_end_matches('/').to_lowercase(),
    }
}

/// Matching key for an email address.
pub fn email_key(raw: &str) -> String {
    raw.trim().trim_start_matches("mailto:").trim().to_lowercase()
}

/// Twitter/X handle without `@`, from either a profile URL or a bare handle.
pub fn handle_key(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let handle = match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => url
            .path_segments()
            .and_then(|mut segs| segs.find(|s| !s.is_empty()))
            .unwrap_or("")
            .to_string(),
        _ => raw
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string(),
    };
    handle.trim_start_matches('@').to_lowercase()
}
