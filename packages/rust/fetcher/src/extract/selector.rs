//! CSS-selector driven extractor.
//!
//! Configured per source from `[sources.selectors]`, so a new outlet needs
//! only selectors, not code. Site-specific extractors with custom logic can
//! implement [`Extractor`] directly.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use bylines_shared::{
    Article, ArticleDetails, BylinesError, Contacts, Observation, ProfileFragment, Result,
    SelectorConfig, SourceConfig,
};

use super::{Extractor, classify_contact};

/// Extractor built from a source's selector table.
pub struct SelectorExtractor {
    source_id: String,
    listing: ListingSelectors,
    article: ArticleSelectors,
    profile: ProfileSelectors,
}

struct ListingSelectors {
    item: Option<Selector>,
    author: Option<Selector>,
    title: Option<Selector>,
    link: Option<Selector>,
    date: Option<Selector>,
}

struct ArticleSelectors {
    author: Option<Selector>,
    title: Option<Selector>,
    date: Option<Selector>,
}

struct ProfileSelectors {
    root: Option<Selector>,
    name: Option<Selector>,
    title: Option<Selector>,
    social: Option<Selector>,
    topics: Option<Selector>,
    article: Option<Selector>,
    article_title: Option<Selector>,
    article_link: Option<Selector>,
    article_date: Option<Selector>,
}

impl SelectorExtractor {
    /// Compile every configured selector. An invalid selector is a config error.
    pub fn from_config(source: &SourceConfig) -> Result<Self> {
        let s: &SelectorConfig = &source.selectors;
        Ok(Self {
            source_id: source.name.clone(),
            listing: ListingSelectors {
                item: compile("listing_item", &s.listing_item)?,
                author: compile("listing_author", &s.listing_author)?,
                title: compile("listing_title", &s.listing_title)?,
                link: compile("listing_link", &s.listing_link)?,
                date: compile("listing_date", &s.listing_date)?,
            },
            article: ArticleSelectors {
                author: compile("article_author", &s.article_author)?,
                title: compile("article_title", &s.article_title)?,
                date: compile("article_date", &s.article_date)?,
            },
            profile: ProfileSelectors {
                root: compile("profile_root", &s.profile_root)?,
                name: compile("profile_name", &s.profile_name)?,
                title: compile("profile_title", &s.profile_title)?,
                social: compile("profile_social", &s.profile_social)?,
                topics: compile("profile_topics", &s.profile_topics)?,
                article: compile("profile_article", &s.profile_article)?,
                article_title: compile("profile_article_title", &s.profile_article_title)?,
                article_link: compile("profile_article_link", &s.profile_article_link)?,
                article_date: compile("profile_article_date", &s.profile_article_date)?,
            },
        })
    }
}

impl Extractor for SelectorExtractor {
    fn listing(&self, html: &str, page_url: &Url) -> Vec<Observation> {
        let Some(item_sel) = &self.listing.item else {
            debug!(source = %self.source_id, "no listing_item selector configured");
            return Vec::new();
        };

        let doc = Html::parse_document(html);
        let mut observations = Vec::new();

        for item in doc.select(item_sel) {
            let link = first_href(item, &self.listing.link, page_url).unwrap_or_default();
            if link.is_empty() {
                debug!(source = %self.source_id, "teaser without article link, skipping");
                continue;
            }

            observations.push(Observation {
                author_name: first_text(item, &self.listing.author),
                author_url: first_href(item, &self.listing.author, page_url),
                article: Article {
                    title: first_text(item, &self.listing.title),
                    link,
                    date: first_date(item, &self.listing.date),
                },
                source_id: self.source_id.clone(),
            });
        }

        debug!(
            source = %self.source_id,
            url = %page_url,
            count = observations.len(),
            "listing extracted"
        );
        observations
    }

    fn article(&self, html: &str, url: &Url) -> ArticleDetails {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        ArticleDetails {
            author_name: first_text(root, &self.article.author),
            author_url: first_href(root, &self.article.author, url),
            title: first_text(root, &self.article.title),
            date: first_date(root, &self.article.date),
        }
    }

    fn profile(&self, html: &str, url: &Url) -> ProfileFragment {
        let doc = Html::parse_document(html);
        let scope = match &self.profile.root {
            Some(sel) => match doc.select(sel).next() {
                Some(el) => el,
                None => {
                    debug!(source = %self.source_id, %url, "profile section not found");
                    return ProfileFragment::default();
                }
            },
            None => doc.root_element(),
        };

        let mut contacts = Contacts::default();
        if let Some(sel) = &self.profile.social {
            for el in scope.select(sel) {
                if let Some(href) = el.value().attr("href") {
                    classify_contact(href, &mut contacts);
                }
            }
        }

        let mut topics: Vec<String> = Vec::new();
        if let Some(sel) = &self.profile.topics {
            for el in scope.select(sel) {
                let topic = text_of(el);
                if !topic.is_empty() && !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }

        let mut articles = Vec::new();
        if let Some(sel) = &self.profile.article {
            for el in scope.select(sel) {
                let link = first_href(el, &self.profile.article_link, url).unwrap_or_default();
                if link.is_empty() {
                    continue;
                }
                articles.push(Article {
                    title: first_text(el, &self.profile.article_title),
                    link,
                    date: first_date(el, &self.profile.article_date),
                });
            }
        }

        ProfileFragment {
            name: first_text(scope, &self.profile.name),
            title: first_text(scope, &self.profile.title),
            contacts,
            topics,
            articles,
        }
    }

    fn name(&self) -> &str {
        "selector"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compile(field: &str, raw: &Option<String>) -> Result<Option<Selector>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(css) => Selector::parse(css)
            .map(Some)
            .map_err(|e| BylinesError::config(format!("invalid selector {field} = '{css}': {e}"))),
    }
}

/// Element text with whitespace collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_match<'a>(scope: ElementRef<'a>, sel: &Option<Selector>) -> Option<ElementRef<'a>> {
    sel.as_ref().and_then(|s| scope.select(s).next())
}

fn first_text(scope: ElementRef<'_>, sel: &Option<Selector>) -> String {
    first_match(scope, sel).map(text_of).unwrap_or_default()
}

/// `datetime` attribute when present (machine-readable), otherwise the text.
fn first_date(scope: ElementRef<'_>, sel: &Option<Selector>) -> String {
    match first_match(scope, sel) {
        Some(el) => match el.value().attr("datetime") {
            Some(dt) if !dt.trim().is_empty() => dt.trim().to_string(),
            _ => text_of(el),
        },
        None => String::new(),
    }
}

/// Resolved `href` of the first match, or of the first link inside it.
fn first_href(scope: ElementRef<'_>, sel: &Option<Selector>, base: &Url) -> Option<String> {
    let el = first_match(scope, sel)?;
    let href = match el.value().attr("href") {
        Some(h) => h,
        None => {
            let link_sel = Selector::parse("a[href]").ok()?;
            el.select(&link_sel).next()?.value().attr("href")?
        }
    };
    resolve_link(href, base)
}

fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    let s = resolved.to_string();
    Some(s.trim_end_matches('/').to_string())
}
