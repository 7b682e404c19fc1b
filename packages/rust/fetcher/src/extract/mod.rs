//! Extractor contract and built-in implementations.
//!
//! An extractor turns raw page content into structured records for one of
//! three page classes: listing, article, or profile. Extraction is pure and
//! idempotent; a missing element yields an empty default, never an error.

mod selector;

use url::Url;

use bylines_shared::{ArticleDetails, Contacts, Observation, ProfileFragment};

pub use selector::SelectorExtractor;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Turns fetched HTML into byline records.
pub trait Extractor: Send + Sync {
    /// Article teasers with their bylines from a listing page.
    fn listing(&self, html: &str, page_url: &Url) -> Vec<Observation>;

    /// Byline, headline, and date from a single article page.
    fn article(&self, html: &str, url: &Url) -> ArticleDetails;

    /// Stable reporter attributes from a profile page.
    fn profile(&self, html: &str, url: &Url) -> ProfileFragment;

    /// Human-readable extractor name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Contact classification
// ---------------------------------------------------------------------------

/// Route a profile link into the matching contact channel.
///
/// The first link seen for a channel wins. Returns `false` for links that
/// are not contact channels.
pub fn classify_contact(href: &str, contacts: &mut Contacts) -> bool {
    let href = href.trim();
    let lower = href.to_lowercase();

    if let Some(address) = lower.strip_prefix("mailto:") {
        let address = address.split('?').next().unwrap_or("").trim();
        return set_once(&mut contacts.email, address);
    }
    if lower.starts_with("tel:") {
        return set_once(&mut contacts.phone, href[4..].trim());
    }

    let Ok(url) = Url::parse(href) else {
        return false;
    };
    let host = url.host_str().unwrap_or("").trim_start_matches("www.");
    let slot = match host {
        "x.com" | "twitter.com" | "mobile.twitter.com" => &mut contacts.twitter,
        "facebook.com" | "m.facebook.com" | "fb.com" => &mut contacts.facebook,
        "linkedin.com" => &mut contacts.linkedin,
        "instagram.com" => &mut contacts.instagram,
        _ if host.ends_with(".linkedin.com") => &mut contacts.linkedin,
        _ => return false,
    };
    set_once(slot, href.trim_end_matches('/'))
}

fn set_once(slot: &mut String, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if slot.is_empty() {
        *slot = value.to_string();
    }
    true
}
