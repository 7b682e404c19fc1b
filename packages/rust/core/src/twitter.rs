//! Twitter/X enrichment of the directory.
//!
//! [`backfill_twitter`] looks up a handle for every record that has a name
//! but no Twitter/X value, and writes only that field. [`search_reporters`]
//! discovers reporters through search queries; [`sync_search_results`] adds
//! the ones the directory does not know yet and leaves existing records
//! untouched.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use bylines_fetcher::{TwitterClient, TwitterUser};
use bylines_shared::{Contacts, DirectoryRecord, Fields, MatchKey, Reporter, Result};
use bylines_storage::DirectoryStore;

use crate::identity::{clean_byline, handle_key, name_key};
use crate::sync::{DirectoryIndex, FIELD_NAME, FIELD_TWITTER, to_fields};

/// Match order for search results: a handle is the strongest identity.
pub const SEARCH_MATCH_PRIORITY: &[MatchKey] =
    &[MatchKey::Handle, MatchKey::Name, MatchKey::Email];

// ---------------------------------------------------------------------------
// Backfill
// ---------------------------------------------------------------------------

/// Counts reported by [`backfill_twitter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    /// Records in the directory snapshot.
    pub records: usize,
    /// Records without a name to search for.
    pub skipped: usize,
    pub already_had: usize,
    pub found: usize,
    pub not_found: usize,
    pub updated: usize,
    /// Lookups or writes that errored.
    pub failed: usize,
}

/// Fill the Twitter/X field of every named record that lacks one.
///
/// A failed lookup or write is counted and skipped. With `dry_run` nothing is
/// written and `updated` stays zero.
#[instrument(skip_all, fields(dry_run = dry_run))]
pub async fn backfill_twitter(
    store: &dyn DirectoryStore,
    client: &TwitterClient,
    dry_run: bool,
) -> Result<BackfillSummary> {
    let snapshot = store.list_all().await?;
    let mut summary = BackfillSummary {
        records: snapshot.len(),
        ..Default::default()
    };

    for record in &snapshot {
        let name = record.field(FIELD_NAME).trim();
        if name.is_empty() {
            summary.skipped += 1;
            continue;
        }
        if !record.field(FIELD_TWITTER).is_empty() {
            debug!(name, twitter = record.field(FIELD_TWITTER), "already has twitter");
            summary.already_had += 1;
            continue;
        }

        let url = match client.find_user(name).await {
            Ok(user) => user.and_then(|u| u.profile_url()),
            Err(e) => {
                warn!(name, error = %e, "twitter lookup failed, skipping");
                summary.failed += 1;
                continue;
            }
        };
        let Some(url) = url else {
            debug!(name, "no twitter profile found");
            summary.not_found += 1;
            continue;
        };

        summary.found += 1;
        if dry_run {
            info!(name, %url, "found (dry run)");
            continue;
        }
        match write_twitter(store, record, &url).await {
            Ok(()) => {
                info!(name, %url, "twitter updated");
                summary.updated += 1;
            }
            Err(e) => {
                warn!(name, id = %record.id, error = %e, "twitter update failed, skipping");
                summary.failed += 1;
            }
        }
    }

    info!(
        records = summary.records,
        already_had = summary.already_had,
        found = summary.found,
        not_found = summary.not_found,
        updated = summary.updated,
        failed = summary.failed,
        "twitter backfill complete"
    );
    Ok(summary)
}

async fn write_twitter(
    store: &dyn DirectoryStore,
    record: &DirectoryRecord,
    url: &str,
) -> Result<()> {
    let mut fields = Fields::new();
    fields.insert(FIELD_TWITTER.to_string(), url.to_string());
    store.update(&record.id, &fields).await
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Run every query, following result cursors up to `max_pages` per query.
///
/// A failed page ends its query only. Users are de-duplicated by id in
/// first-seen order.
#[instrument(skip_all, fields(queries = queries.len()))]
pub async fn search_reporters(
    client: &TwitterClient,
    queries: &[String],
    max_pages: u32,
) -> Vec<Reporter> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut reporters = Vec::new();

    for query in queries {
        let mut cursor: Option<String> = None;
        for _ in 0..max_pages.max(1) {
            let page = match client.search(query, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(query, error = %e, "search failed, skipping query");
                    break;
                }
            };

            for user in page.users {
                let id = if user.id.is_empty() {
                    handle_key(&user.screen_name)
                } else {
                    user.id.clone()
                };
                if id.is_empty() || !seen.insert(id) {
                    continue;
                }
                if let Some(reporter) = user_reporter(user) {
                    reporters.push(reporter);
                }
            }

            match page.next_cursor.filter(|c| page.has_next_page && !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }

    info!(reporters = reporters.len(), "search results collected");
    reporters
}

fn user_reporter(user: TwitterUser) -> Option<Reporter> {
    let twitter = user.profile_url().unwrap_or_default();
    let display_name = match clean_byline(&user.name) {
        name if name.is_empty() => user.screen_name.trim().trim_start_matches('@').to_string(),
        name => name,
    };

    let identity_key = match handle_key(&twitter) {
        key if key.is_empty() => name_key(&display_name),
        key => key,
    };
    if identity_key.is_empty() {
        return None;
    }

    Some(Reporter {
        identity_key,
        display_name,
        contacts: Contacts {
            twitter,
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Counts reported by [`sync_search_results`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub found: usize,
    pub added: usize,
    /// Already in the directory; left as stored.
    pub existing: usize,
    pub failed: usize,
}

/// Create a record for every reporter not already in the directory.
#[instrument(skip_all, fields(reporters = reporters.len()))]
pub async fn sync_search_results(
    store: &dyn DirectoryStore,
    reporters: &[Reporter],
) -> Result<SearchSummary> {
    let snapshot = store.list_all().await?;
    let mut index = DirectoryIndex::build(snapshot, SEARCH_MATCH_PRIORITY);
    let mut summary = SearchSummary {
        found: reporters.len(),
        ..Default::default()
    };

    for reporter in reporters {
        if index.lookup(reporter, SEARCH_MATCH_PRIORITY).is_some() {
            summary.existing += 1;
            continue;
        }
        let fields = to_fields(reporter);
        match store.create(&fields).await {
            Ok(id) => {
                info!(reporter = %reporter.display_name, %id, "created");
                index.insert(DirectoryRecord { id, fields });
                summary.added += 1;
            }
            Err(e) => {
                warn!(reporter = %reporter.display_name, error = %e, "create failed, skipping");
                summary.failed += 1;
            }
        }
    }

    info!(
        added = summary.added,
        existing = summary.existing,
        failed = summary.failed,
        "search results synchronized"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use bylines_fetcher::Politeness;
    use bylines_shared::TwitterConfig;
    use bylines_storage::MemoryDirectory;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> TwitterClient {
        let config = TwitterConfig {
            api_url: server.uri(),
            ..Default::default()
        };
        TwitterClient::new(&config, "test-key".into())
            .unwrap()
            .with_politeness(Politeness::disabled())
    }

    fn record(id: &str, pairs: &[(&str, &str)]) -> DirectoryRecord {
        DirectoryRecord {
            id: id.into(),
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn users(list: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "users": list }))
    }

    #[tokio::test]
    async fn backfill_writes_only_blank_twitter_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twitter/user/search"))
            .and(query_param("query", "Jane Doe"))
            .respond_with(users(serde_json::json!([
                {"id": "1", "name": "Jane Doe", "screen_name": "janedoe"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/search"))
            .and(query_param("query", "John Roe"))
            .respond_with(users(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryDirectory::with_records(vec![
            record("r1", &[("reporter_name", "Jane Doe"), ("email", "jane@example.com")]),
            record("r2", &[("reporter_name", "Old Hand"), ("twitter", "@oldhand")]),
            record("r3", &[("reporter_name", "John Roe"), ("twitter", "")]),
            record("r4", &[("reporter_name", "  ")]),
        ]);

        let summary = backfill_twitter(&store, &client(&server), false).await.unwrap();
        assert_eq!(
            summary,
            BackfillSummary {
                records: 4,
                skipped: 1,
                already_had: 1,
                found: 1,
                not_found: 1,
                updated: 1,
                failed: 0,
            }
        );

        let stored = store.snapshot();
        assert_eq!(stored[0].field("twitter"), "https://x.com/janedoe");
        assert_eq!(stored[0].field("email"), "jane@example.com");
        assert_eq!(stored[1].field("twitter"), "@oldhand");
        assert_eq!(stored[2].field("twitter"), "");
    }

    #[tokio::test]
    async fn backfill_dry_run_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(path("/twitter/user/search"))
            .respond_with(users(serde_json::json!([
                {"id": "1", "name": "Jane Doe", "screen_name": "janedoe"}
            ])))
            .mount(&server)
            .await;

        let store =
            MemoryDirectory::with_records(vec![record("r1", &[("reporter_name", "Jane Doe")])]);
        let summary = backfill_twitter(&store, &client(&server), true).await.unwrap();

        assert_eq!((summary.found, summary.updated), (1, 0));
        assert_eq!(store.snapshot()[0].field("twitter"), "");
    }

    #[tokio::test]
    async fn backfill_lookup_error_is_isolated() {
        let server = MockServer::start().await;
        Mock::given(path("/twitter/user/search"))
            .and(query_param("query", "Jane Doe"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/search"))
            .and(query_param("query", "John Roe"))
            .respond_with(users(serde_json::json!([
                {"id": "2", "name": "John Roe", "screen_name": "jroe"}
            ])))
            .mount(&server)
            .await;

        let store = MemoryDirectory::with_records(vec![
            record("r1", &[("reporter_name", "Jane Doe")]),
            record("r2", &[("reporter_name", "John Roe")]),
        ]);
        let summary = backfill_twitter(&store, &client(&server), false).await.unwrap();

        assert_eq!((summary.failed, summary.updated), (1, 1));
        assert_eq!(store.snapshot()[1].field("twitter"), "https://x.com/jroe");
    }

    #[tokio::test]
    async fn search_follows_cursors_and_dedupes_users() {
        let server = MockServer::start().await;
        Mock::given(path("/twitter/user/search"))
            .and(query_param("query", "reportero"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [
                    {"id": "1", "name": "Jane Doe", "screen_name": "janedoe"},
                    {"id": "3", "name": "Ana Ruiz", "screen_name": "anaruiz"}
                ],
                "has_next_page": false
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/search"))
            .and(query_param("query", "reportero"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [
                    {"id": "1", "name": "Jane Doe", "screen_name": "janedoe"},
                    {"id": "2", "name": "John Roe", "screen_name": "jroe"}
                ],
                "has_next_page": true,
                "next_cursor": "page2"
            })))
            .mount(&server)
            .await;
        Mock::given(path("/twitter/user/search"))
            .and(query_param("query", "periodista"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let queries = vec!["reportero".to_string(), "periodista".to_string()];
        let reporters = search_reporters(&client(&server), &queries, 5).await;

        let handles: Vec<_> = reporters.iter().map(|r| r.identity_key.as_str()).collect();
        assert_eq!(handles, vec!["janedoe", "jroe", "anaruiz"]);
        assert_eq!(reporters[0].contacts.twitter, "https://x.com/janedoe");
    }

    #[tokio::test]
    async fn search_results_only_add_unknown_reporters() {
        let store = MemoryDirectory::with_records(vec![
            record("r1", &[("reporter_name", "Someone Else"), ("twitter", "@JaneDoe")]),
            record("r2", &[("reporter_name", "John Roe"), ("pub_1_title", "Kept")]),
        ]);
        let reporters: Vec<Reporter> = [
            ("Jane Doe", "janedoe"),
            ("John Roe", "jroe"),
            ("Ana Ruiz", "anaruiz"),
        ]
        .into_iter()
        .filter_map(|(name, handle)| {
            user_reporter(TwitterUser {
                id: handle.into(),
                name: name.into(),
                screen_name: handle.into(),
                ..Default::default()
            })
        })
        .collect();

        let summary = sync_search_results(&store, &reporters).await.unwrap();
        assert_eq!(
            summary,
            SearchSummary { found: 3, added: 1, existing: 2, failed: 0 }
        );

        let stored = store.snapshot();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].field("pub_1_title"), "Kept");
        assert_eq!(stored[2].field("reporter_name"), "Ana Ruiz");
        assert_eq!(stored[2].field("twitter"), "https://x.com/anaruiz");
    }
}
