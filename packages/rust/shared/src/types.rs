//! Core data model: observations, articles, canonical reporters, and the
//! flattened directory records they are synchronized into.
//!
//! Text fields use an empty string for "not found"; extraction never fails on
//! a missing field, it leaves the default in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Upper bound on the recent-article list carried by a reporter.
pub const MAX_ARTICLES: usize = 4;

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A published piece attributed to a reporter.
///
/// Two articles are equal when their links are equal; title and date are
/// descriptive only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Article {
    /// Headline text.
    #[serde(default)]
    pub title: String,
    /// Absolute article URL.
    #[serde(default)]
    pub link: String,
    /// Free-form date text as printed by the source.
    #[serde(default)]
    pub date: String,
}

impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link
    }
}

impl Eq for Article {}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One scraped (author, article) pairing, before grouping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    /// Byline text.
    pub author_name: String,
    /// Stable per-author URL, when the source exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    /// The article this byline was found on.
    pub article: Article,
    /// Name of the source that produced the observation.
    #[serde(default)]
    pub source_id: String,
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Contact channels for a reporter. These are the fields protected by the
/// preserve-non-empty merge rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub twitter: String,
    #[serde(default)]
    pub linkedin: String,
    #[serde(default)]
    pub facebook: String,
    #[serde(default)]
    pub instagram: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub cellular: String,
}

impl Contacts {
    /// Copy every non-empty channel of `other` into a blank channel of `self`.
    pub fn fill_blanks(&mut self, other: &Contacts) {
        fill(&mut self.email, &other.email);
        fill(&mut self.twitter, &other.twitter);
        fill(&mut self.linkedin, &other.linkedin);
        fill(&mut self.facebook, &other.facebook);
        fill(&mut self.instagram, &other.instagram);
        fill(&mut self.phone, &other.phone);
        fill(&mut self.cellular, &other.cellular);
    }

    /// True when no channel is known.
    pub fn is_empty(&self) -> bool {
        *self == Contacts::default()
    }
}

fn fill(dst: &mut String, src: &str) {
    if dst.trim().is_empty() && !src.trim().is_empty() {
        *dst = src.trim().to_string();
    }
}

/// The outlet a reporter writes for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub website: String,
}

/// Canonical reporter profile, built once per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reporter {
    /// Normalized grouping key, unique (case-insensitive) within a run.
    pub identity_key: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub title_role: String,
    #[serde(default)]
    pub contacts: Contacts,
    #[serde(default)]
    pub topics: Vec<String>,
    /// At most [`MAX_ARTICLES`], most recent first when dates parse.
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub media: Media,
}

// ---------------------------------------------------------------------------
// Extractor outputs
// ---------------------------------------------------------------------------

/// Fields read from an individual article page.
#[derive(Debug, Clone, Default)]
pub struct ArticleDetails {
    pub author_name: String,
    pub author_url: Option<String>,
    pub title: String,
    pub date: String,
}

/// Stable attributes read from a reporter's profile page.
#[derive(Debug, Clone, Default)]
pub struct ProfileFragment {
    pub name: String,
    pub title: String,
    pub contacts: Contacts,
    pub topics: Vec<String>,
    /// Pinned or latest articles listed on the profile page.
    pub articles: Vec<Article>,
}

impl ProfileFragment {
    /// True when the profile page yielded nothing usable.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.title.is_empty()
            && self.contacts.is_empty()
            && self.topics.is_empty()
            && self.articles.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A known reporter supplied as configuration, so reporters without recent
/// bylines still reach the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ---------------------------------------------------------------------------
// DirectoryRecord
// ---------------------------------------------------------------------------

/// Flat named-attribute mapping written to and read from the directory store.
pub type Fields = BTreeMap<String, String>;

/// A persisted directory row: opaque id plus its fields. May carry fields
/// this system never writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl DirectoryRecord {
    /// Trimmed value of a field, or `""` when absent.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(|v| v.trim()).unwrap_or("")
    }
}
