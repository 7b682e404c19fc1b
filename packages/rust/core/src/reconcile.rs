//! Folding byline observations into canonical reporters.
//!
//! Observations are grouped by identity key in arrival order, each bucket's
//! article list is ordered by date and capped, the source roster is merged
//! in, and finally profile pages fill in stable attributes.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, instrument};

use bylines_shared::{
    Article, BylinesError, IdentityStrategy, MAX_ARTICLES, Observation, ProfileFragment, Reporter,
    Result, RosterEntry, SourceConfig,
};

use crate::dates::parse_article_date;
use crate::identity::{clean_byline, name_key, url_key};

/// Supplies profile-page attributes for a reporter's profile URL.
///
/// `None` means the profile could not be fetched; the reporter is then left
/// exactly as it was.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, url: &str) -> Option<ProfileFragment>;
}

/// Per-source reconciliation rules.
pub struct Reconciler<'a> {
    source: &'a SourceConfig,
    aliases: Vec<(Regex, String)>,
}

impl<'a> Reconciler<'a> {
    /// Compile the source's name aliases. An invalid pattern is a config error.
    pub fn new(source: &'a SourceConfig) -> Result<Self> {
        let aliases = source
            .aliases
            .iter()
            .map(|alias| {
                RegexBuilder::new(&alias.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, alias.name.clone()))
                    .map_err(|e| {
                        BylinesError::config(format!(
                            "source '{}': invalid alias pattern '{}': {e}",
                            source.name, alias.pattern
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { source, aliases })
    }

    // -----------------------------------------------------------------------
    // Grouping
    // -----------------------------------------------------------------------

    /// Group observations into reporters, in first-seen order.
    #[instrument(skip_all, fields(source = %self.source.name))]
    pub fn reconcile(&self, observations: impl IntoIterator<Item = Observation>) -> Vec<Reporter> {
        let mut reporters: Vec<Reporter> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut dropped = 0usize;

        for obs in observations {
            let (display_name, aliased) = self.display_name(&obs.author_name);
            let key = self.identity_key(&display_name, obs.author_url.as_deref(), aliased);
            if key.is_empty() {
                dropped += 1;
                continue;
            }

            let idx = *by_key.entry(key.clone()).or_insert_with(|| {
                reporters.push(Reporter {
                    identity_key: key,
                    display_name: display_name.clone(),
                    media: self.source.media.clone(),
                    ..Default::default()
                });
                reporters.len() - 1
            });
            let reporter = &mut reporters[idx];

            if reporter.profile_url.is_none() && !aliased {
                reporter.profile_url = obs
                    .author_url
                    .as_deref()
                    .map(|u| u.trim().trim_end_matches('/'))
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
            }
            if reporter.display_name.is_empty() {
                reporter.display_name = display_name;
            }
            if !obs.article.link.is_empty() && !reporter.articles.contains(&obs.article) {
                reporter.articles.push(obs.article);
            }
        }

        for reporter in &mut reporters {
            order_articles(&mut reporter.articles, &self.source.date_formats);
        }

        if dropped > 0 {
            debug!(dropped, "observations without a usable byline");
        }
        info!(reporters = reporters.len(), "observations reconciled");
        reporters
    }

    /// Cleaned byline, replaced by its alias when one matches.
    fn display_name(&self, raw: &str) -> (String, bool) {
        let cleaned = clean_byline(raw);
        match self.aliases.iter().find(|(re, _)| re.is_match(&cleaned)) {
            Some((_, canonical)) => (canonical.clone(), true),
            None => (cleaned, false),
        }
    }

    /// Aliased bylines are always keyed by name: one alias covers many URLs.
    fn identity_key(&self, display_name: &str, url: Option<&str>, aliased: bool) -> String {
        match (self.source.identity, url) {
            (IdentityStrategy::ProfileUrl, Some(url)) if !aliased && !url_key(url).is_empty() => {
                url_key(url)
            }
            _ => name_key(display_name),
        }
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    /// Append every roster entry not already present, with no articles.
    /// Entries matching a discovered reporter fill its blank URL and title.
    pub fn augment_roster(&self, reporters: &mut Vec<Reporter>) {
        let mut added = 0usize;
        for entry in &self.source.roster {
            let candidate = self.roster_reporter(entry);
            let found = reporters
                .iter_mut()
                .find(|r| roster_matches(entry, &candidate, r));
            match found {
                Some(existing) => {
                    let url = entry.url.trim().trim_end_matches('/');
                    if existing.profile_url.is_none() && !url.is_empty() {
                        existing.profile_url = Some(url.to_string());
                    }
                    if existing.title_role.is_empty() {
                        if let Some(title) = entry.title.as_deref() {
                            existing.title_role = title.trim().to_string();
                        }
                    }
                }
                None => {
                    if candidate.identity_key.is_empty() {
                        continue;
                    }
                    reporters.push(candidate);
                    added += 1;
                }
            }
        }
        debug!(source = %self.source.name, added, "roster merged");
    }

    fn roster_reporter(&self, entry: &RosterEntry) -> Reporter {
        let (display_name, aliased) = self.display_name(&entry.name);
        let url = entry.url.trim().trim_end_matches('/');
        let url = (!url.is_empty()).then(|| url.to_string());

        Reporter {
            identity_key: self.identity_key(&display_name, url.as_deref(), aliased),
            display_name,
            profile_url: url,
            title_role: entry.title.as_deref().unwrap_or("").trim().to_string(),
            media: self.source.media.clone(),
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    /// Fetch and merge the profile page of every reporter that has one.
    /// Returns how many reporters were augmented.
    #[instrument(skip_all, fields(source = %self.source.name))]
    pub async fn augment_profiles(
        &self,
        reporters: &mut [Reporter],
        profiles: &dyn ProfileSource,
    ) -> usize {
        let mut augmented = 0usize;
        for reporter in reporters.iter_mut() {
            let Some(url) = reporter.profile_url.clone() else {
                continue;
            };
            match profiles.profile(&url).await {
                Some(fragment) if !fragment.is_empty() => {
                    self.apply_profile(reporter, fragment);
                    augmented += 1;
                }
                Some(_) => debug!(%url, "profile page yielded nothing"),
                None => debug!(%url, "profile unavailable, keeping listing data"),
            }
        }
        info!(augmented, "profiles merged");
        augmented
    }

    /// Merge a profile fragment: name and title overwrite, contacts and
    /// topics fill blanks, profile articles replace listing ones only when
    /// the profile has any.
    pub fn apply_profile(&self, reporter: &mut Reporter, fragment: ProfileFragment) {
        let name = clean_byline(&fragment.name);
        if !name.is_empty() {
            reporter.display_name = name;
        }
        if !fragment.title.trim().is_empty() {
            reporter.title_role = fragment.title.trim().to_string();
        }
        reporter.contacts.fill_blanks(&fragment.contacts);
        if reporter.topics.is_empty() {
            reporter.topics = fragment.topics;
        }

        let mut articles: Vec<Article> = Vec::new();
        for article in fragment.articles {
            if !article.link.is_empty() && !articles.contains(&article) {
                articles.push(article);
            }
        }
        if !articles.is_empty() {
            order_articles(&mut articles, &self.source.date_formats);
            reporter.articles = articles;
        }
    }
}

/// Most recent first for parseable dates; undated articles follow in arrival
/// order. Capped at [`MAX_ARTICLES`].
pub fn order_articles(articles: &mut Vec<Article>, date_formats: &[String]) {
    let mut keyed: Vec<_> = articles
        .drain(..)
        .map(|a| (parse_article_date(&a.date, date_formats), a))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    articles.extend(keyed.into_iter().map(|(_, a)| a).take(MAX_ARTICLES));
}

/// `candidate` is the entry resolved through aliases; its identity key must
/// stay unique among the run's reporters.
fn roster_matches(entry: &RosterEntry, candidate: &Reporter, reporter: &Reporter) -> bool {
    if !candidate.identity_key.is_empty() && reporter.identity_key == candidate.identity_key {
        return true;
    }
    let entry_url = url_key(&entry.url);
    if !entry_url.is_empty() {
        let reporter_url = reporter.profile_url.as_deref().map(url_key);
        if reporter.identity_key == entry_url || reporter_url.as_deref() == Some(&entry_url) {
            return true;
        }
    }
    let reporter_name = name_key(&reporter.display_name);
    [name_key(&entry.name), name_key(&candidate.display_name)]
        .iter()
        .any(|key| !key.is_empty() && (reporter.identity_key == *key || reporter_name == *key))
}
