//! Best-effort parsing of the free-text dates sources print next to articles.
//!
//! A date that does not parse is not an error: callers order such articles
//! by arrival instead.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Formats tried after the per-source ones.
const BUILTIN_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
];

const SPANISH_MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

/// Parse article date text. `formats` are `chrono` format strings tried
/// first, in order.
pub fn parse_article_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for fmt in formats {
        if let Some(date) = parse_with(text, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    // ISO timestamps without an offset, e.g. `datetime="2025-01-05T10:00:00"`.
    if let Some(date) = text.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    {
        if text.len() == 10 || text[10..].starts_with('T') || text[10..].starts_with(' ') {
            return Some(date);
        }
    }

    BUILTIN_FORMATS
        .iter()
        .find_map(|fmt| parse_with(text, fmt))
        .or_else(|| parse_spanish(text))
}

fn parse_with(text: &str, fmt: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, fmt)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, fmt).ok().map(|dt| dt.date()))
}

/// "5 de enero de 2025", "5 de enero, 2025", "enero 5, 2025".
fn parse_spanish(text: &str) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .filter(|w| !w.is_empty() && *w != "de" && *w != "del")
        .collect();

    let month_at = words
        .iter()
        .position(|w| SPANISH_MONTHS.iter().any(|(name, _)| name == w))?;
    let month = SPANISH_MONTHS
        .iter()
        .find(|(name, _)| *name == words[month_at])
        .map(|(_, m)| *m)?;

    let numbers: Vec<u32> = words.iter().filter_map(|w| w.parse().ok()).collect();
    let (day, year) = match numbers.as_slice() {
        [a, b, ..] if *b > 31 => (*a, *b as i32),
        [a, b, ..] if *a > 31 => (*b, *a as i32),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
