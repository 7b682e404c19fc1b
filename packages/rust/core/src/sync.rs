//! Synchronizing canonical reporters into the directory store.
//!
//! One snapshot of the directory is read per call and indexed by every
//! configured match key. Each reporter then resolves to at most one record
//! and produces exactly one store write: an update with preserve-merge for
//! contact fields, or a create.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, instrument, warn};

use bylines_shared::{
    BylinesError, DirectoryRecord, Fields, MAX_ARTICLES, MatchKey, Reporter, Result,
};
use bylines_storage::DirectoryStore;

use crate::identity::{email_key, handle_key, name_key, url_key};
use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Field schema
// ---------------------------------------------------------------------------

pub const FIELD_NAME: &str = "reporter_name";
pub const FIELD_TITLE: &str = "title_role";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_PHONE: &str = "phone";
pub const FIELD_CELLULAR: &str = "cellular";
pub const FIELD_TWITTER: &str = "twitter";
pub const FIELD_LINKEDIN: &str = "linkedin";
pub const FIELD_INSTAGRAM: &str = "instagram";
pub const FIELD_FACEBOOK: &str = "facebook";
pub const FIELD_TOPICS: &str = "topics";
pub const FIELD_PROFILE_URL: &str = "profile_url";
pub const FIELD_MEDIA: &str = "media";
pub const FIELD_MEDIA_TYPE: &str = "media_type";
pub const FIELD_MEDIA_WEBSITE: &str = "media_website";

/// Contact fields a blank re-scrape must never erase.
pub const PROTECTED_FIELDS: &[&str] = &[
    FIELD_EMAIL,
    FIELD_TWITTER,
    FIELD_LINKEDIN,
    FIELD_FACEBOOK,
    FIELD_INSTAGRAM,
    FIELD_PHONE,
    FIELD_CELLULAR,
];

/// Flatten a reporter into directory fields. Every article slot is written,
/// blank when unused, so the stored list is fully replaced.
pub fn to_fields(reporter: &Reporter) -> Fields {
    let mut fields = Fields::new();
    let mut put = |k: &str, v: &str| {
        fields.insert(k.to_string(), v.trim().to_string());
    };

    put(FIELD_NAME, &reporter.display_name);
    put(FIELD_TITLE, &reporter.title_role);
    put(FIELD_EMAIL, &reporter.contacts.email);
    put(FIELD_PHONE, &reporter.contacts.phone);
    put(FIELD_CELLULAR, &reporter.contacts.cellular);
    put(FIELD_TWITTER, &reporter.contacts.twitter);
    put(FIELD_LINKEDIN, &reporter.contacts.linkedin);
    put(FIELD_INSTAGRAM, &reporter.contacts.instagram);
    put(FIELD_FACEBOOK, &reporter.contacts.facebook);
    put(FIELD_TOPICS, &reporter.topics.join(", "));
    put(FIELD_PROFILE_URL, reporter.profile_url.as_deref().unwrap_or(""));
    put(FIELD_MEDIA, &reporter.media.name);
    put(FIELD_MEDIA_TYPE, &reporter.media.kind);
    put(FIELD_MEDIA_WEBSITE, &reporter.media.website);

    for slot in 0..MAX_ARTICLES {
        let article = reporter.articles.get(slot);
        let n = slot + 1;
        put(&format!("pub_{n}_title"), article.map_or("", |a| a.title.as_str()));
        put(&format!("pub_{n}_link"), article.map_or("", |a| a.link.as_str()));
        put(&format!("pub_{n}_date"), article.map_or("", |a| a.date.as_str()));
    }
    fields
}

/// Keep stored contact values where the new scrape came back blank.
pub fn preserve_merge(fields: &mut Fields, existing: &DirectoryRecord) {
    for &name in PROTECTED_FIELDS {
        let stored = existing.field(name);
        let blank = fields.get(name).is_none_or(|v| v.trim().is_empty());
        if blank && !stored.is_empty() {
            fields.insert(name.to_string(), stored.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Terminal state of one reporter's synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created(String),
    Updated(String),
    Failed(String),
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Created(_) => self.added += 1,
            SyncOutcome::Updated(_) => self.updated += 1,
            SyncOutcome::Failed(_) => self.failed += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot index
// ---------------------------------------------------------------------------

/// Lookup maps over the directory snapshot, one per match key.
/// The first record seen for a key owns it.
#[derive(Default)]
pub(crate) struct DirectoryIndex {
    records: Vec<DirectoryRecord>,
    maps: HashMap<MatchKey, HashMap<String, usize>>,
}

impl DirectoryIndex {
    pub(crate) fn build(records: Vec<DirectoryRecord>, keys: &[MatchKey]) -> Self {
        let mut index = Self {
            records: Vec::with_capacity(records.len()),
            maps: keys.iter().map(|k| (*k, HashMap::new())).collect(),
        };
        for record in records {
            index.insert(record);
        }
        index
    }

    pub(crate) fn insert(&mut self, record: DirectoryRecord) {
        let pos = self.records.len();
        self.records.push(record);
        self.register(pos);
    }

    fn register(&mut self, pos: usize) {
        let record = &self.records[pos];
        for (key, map) in self.maps.iter_mut() {
            let value = record_key(record, *key);
            if !value.is_empty() {
                map.entry(value).or_insert(pos);
            }
        }
    }

    pub(crate) fn lookup(&self, reporter: &Reporter, priority: &[MatchKey]) -> Option<usize> {
        priority.iter().find_map(|key| {
            let value = reporter_key(reporter, *key);
            if value.is_empty() {
                return None;
            }
            self.maps.get(key).and_then(|m| m.get(&value)).copied()
        })
    }

    fn apply(&mut self, pos: usize, fields: &Fields) {
        self.records[pos]
            .fields
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.register(pos);
    }
}

fn record_key(record: &DirectoryRecord, key: MatchKey) -> String {
    match key {
        MatchKey::Handle => handle_key(record.field(FIELD_TWITTER)),
        MatchKey::Name => name_key(record.field(FIELD_NAME)),
        MatchKey::Email => email_key(record.field(FIELD_EMAIL)),
        MatchKey::ProfileUrl => url_key(record.field(FIELD_PROFILE_URL)),
    }
}

fn reporter_key(reporter: &Reporter, key: MatchKey) -> String {
    match key {
        MatchKey::Handle => handle_key(&reporter.contacts.twitter),
        MatchKey::Name => name_key(&reporter.display_name),
        MatchKey::Email => email_key(&reporter.contacts.email),
        MatchKey::ProfileUrl => url_key(reporter.profile_url.as_deref().unwrap_or("")),
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Matches reporters against the directory and writes them.
pub struct Synchronizer<'a> {
    store: &'a dyn DirectoryStore,
    priority: Vec<MatchKey>,
}

impl<'a> Synchronizer<'a> {
    /// `priority` is the per-source match key order; first match wins.
    /// An empty order would never match and is rejected.
    pub fn new(store: &'a dyn DirectoryStore, priority: &[MatchKey]) -> Result<Self> {
        if priority.is_empty() {
            return Err(BylinesError::config("match priority must name at least one key"));
        }
        Ok(Self {
            store,
            priority: priority.to_vec(),
        })
    }

    /// Synchronize every reporter. Only a failure to read the snapshot is an
    /// error; individual write failures are counted and skipped.
    #[instrument(skip_all, fields(reporters = reporters.len()))]
    pub async fn sync(
        &self,
        reporters: &[Reporter],
        progress: &dyn ProgressReporter,
    ) -> Result<SyncSummary> {
        let snapshot = self.store.list_all().await?;
        info!(records = snapshot.len(), "directory snapshot read");

        let mut index = DirectoryIndex::build(snapshot, &self.priority);
        let mut summary = SyncSummary::default();

        for reporter in reporters {
            let outcome = self.sync_one(reporter, &mut index).await;
            summary.record(&outcome);
            progress.reporter_synced(&reporter.display_name, &outcome);
        }

        info!(
            added = summary.added,
            updated = summary.updated,
            failed = summary.failed,
            "synchronization complete"
        );
        Ok(summary)
    }

    async fn sync_one(&self, reporter: &Reporter, index: &mut DirectoryIndex) -> SyncOutcome {
        let mut fields = to_fields(reporter);

        match index.lookup(reporter, &self.priority) {
            Some(pos) => {
                let id = index.records[pos].id.clone();
                preserve_merge(&mut fields, &index.records[pos]);
                match self.store.update(&id, &fields).await {
                    Ok(()) => {
                        info!(reporter = %reporter.display_name, %id, "updated");
                        index.apply(pos, &fields);
                        SyncOutcome::Updated(id)
                    }
                    Err(e) => {
                        warn!(
                            reporter = %reporter.display_name,
                            %id,
                            error = %e,
                            "update failed, skipping"
                        );
                        SyncOutcome::Failed(e.to_string())
                    }
                }
            }
            None => match self.store.create(&fields).await {
                Ok(id) => {
                    info!(reporter = %reporter.display_name, %id, "created");
                    index.insert(DirectoryRecord {
                        id: id.clone(),
                        fields,
                    });
                    SyncOutcome::Created(id)
                }
                Err(e) => {
                    warn!(reporter = %reporter.display_name, error = %e, "create failed, skipping");
                    SyncOutcome::Failed(e.to_string())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use bylines_shared::{Article, Contacts, Media};
    use bylines_storage::MemoryDirectory;

    use super::*;
    use crate::progress::SilentProgress;

    fn reporter(name: &str) -> Reporter {
        Reporter {
            identity_key: name.to_lowercase(),
            display_name: name.into(),
            media: Media {
                name: "El Vocero".into(),
                kind: "newspaper".into(),
                website: "https://news.example.com".into(),
            },
            ..Default::default()
        }
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

    const DEFAULT_PRIORITY: &[MatchKey] = &[MatchKey::Name, MatchKey::Email];

    #[tokio::test]
    async fn blank_twitter_keeps_stored_handle() {
        let store = MemoryDirectory::with_records(vec![record(
            "rec1",
            &[("reporter_name", "Jane Doe"), ("twitter", "@jane")],
        )]);
        let sync = Synchronizer::new(&store, DEFAULT_PRIORITY).unwrap();

        let summary = sync
            .sync(&[reporter("Jane Doe")], &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary, SyncSummary { added: 0, updated: 1, failed: 0 });
        let stored = &store.snapshot()[0];
        assert_eq!(stored.field("twitter"), "@jane");
    }

    #[tokio::test]
    async fn every_protected_field_is_preserved() {
        let pairs: Vec<(&str, &str)> = PROTECTED_FIELDS.iter().map(|f| (*f, "known")).collect();
        let mut existing = pairs.clone();
        existing.push(("reporter_name", "Jane Doe"));
        existing.push(("title_role", "Reporter"));
        let store = MemoryDirectory::with_records(vec![record("rec1", &existing)]);

        let mut jane = reporter("Jane Doe");
        jane.title_role = String::new();
        Synchronizer::new(&store, DEFAULT_PRIORITY)
            .unwrap()
            .sync(&[jane], &SilentProgress)
            .await
            .unwrap();

        let stored = &store.snapshot()[0];
        for field in PROTECTED_FIELDS {
            assert_eq!(stored.field(field), "known", "{field} erased");
        }
        // unprotected fields are last-write-wins
        assert_eq!(stored.field("title_role"), "");
    }

    #[tokio::test]
    async fn new_contact_values_overwrite_stored_ones() {
        let store = MemoryDirectory::with_records(vec![record(
            "rec1",
            &[("reporter_name", "Jane Doe"), ("email", "old@example.com")],
        )]);
        let mut jane = reporter("Jane Doe");
        jane.contacts.email = "new@example.com".into();

        Synchronizer::new(&store, DEFAULT_PRIORITY)
            .unwrap()
            .sync(&[jane], &SilentProgress)
            .await
            .unwrap();
        assert_eq!(store.snapshot()[0].field("email"), "new@example.com");
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let store = MemoryDirectory::new();
        let mut jane = reporter("Jane Doe");
        jane.title_role = "Editor".into();
        jane.contacts = Contacts {
            email: "jane@example.com".into(),
            twitter: "https://x.com/jane".into(),
            ..Default::default()
        };
        jane.topics = vec!["Politics".into(), "Budget".into()];
        jane.articles = vec![Article {
            title: "Budget passes".into(),
            link: "https://news.example.com/budget".into(),
            date: "05/01/2025".into(),
        }];
        let reporters = vec![jane, reporter("John Roe")];
        let sync = Synchronizer::new(&store, DEFAULT_PRIORITY).unwrap();

        let first = sync.sync(&reporters, &SilentProgress).await.unwrap();
        assert_eq!(first, SyncSummary { added: 2, updated: 0, failed: 0 });
        let after_first = store.snapshot();

        let second = sync.sync(&reporters, &SilentProgress).await.unwrap();
        assert_eq!(second, SyncSummary { added: 0, updated: 2, failed: 0 });
        assert_eq!(store.snapshot(), after_first);

        let jane = &after_first[0];
        assert_eq!(jane.field("topics"), "Politics, Budget");
        assert_eq!(jane.field("pub_1_link"), "https://news.example.com/budget");
        assert_eq!(jane.field("pub_2_link"), "");
        assert_eq!(jane.field("media_type"), "newspaper");
    }

    #[tokio::test]
    async fn match_priority_order_is_respected() {
        let store = MemoryDirectory::with_records(vec![
            record("by-name", &[("reporter_name", "Jane Doe")]),
            record("by-handle", &[("reporter_name", "J. Doe"), ("twitter", "@JaneDoe")]),
        ]);
        let mut jane = reporter("Jane Doe");
        jane.contacts.twitter = "https://x.com/janedoe".into();

        let handle_first = [MatchKey::Handle, MatchKey::Name, MatchKey::Email];
        Synchronizer::new(&store, &handle_first)
            .unwrap()
            .sync(&[jane.clone()], &SilentProgress)
            .await
            .unwrap();
        let records = store.snapshot();
        assert_eq!(records[1].field("reporter_name"), "Jane Doe");
        assert_eq!(records[0].field("twitter"), "");

        let name_first = [MatchKey::Name];
        Synchronizer::new(&store, &name_first)
            .unwrap()
            .sync(&[jane], &SilentProgress)
            .await
            .unwrap();
        assert_eq!(store.snapshot()[0].field("twitter"), "https://x.com/janedoe");
    }

    #[tokio::test]
    async fn email_matches_when_name_differs() {
        let store = MemoryDirectory::with_records(vec![record(
            "rec1",
            &[("reporter_name", "Jane D."), ("email", "Jane@Example.com")],
        )]);
        let mut jane = reporter("Jane Doe");
        jane.contacts.email = "jane@example.com".into();

        let summary = Synchronizer::new(&store, DEFAULT_PRIORITY)
            .unwrap()
            .sync(&[jane], &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_snapshot_keys_first_writer_wins() {
        let store = MemoryDirectory::with_records(vec![
            record("first", &[("reporter_name", "Jane Doe")]),
            record("second", &[("reporter_name", "jane doe")]),
        ]);
        Synchronizer::new(&store, DEFAULT_PRIORITY)
            .unwrap()
            .sync(&[reporter("Jane Doe")], &SilentProgress)
            .await
            .unwrap();

        let records = store.snapshot();
        assert_eq!(records[0].field("media"), "El Vocero");
        assert_eq!(records[1].field("media"), "");
    }

    #[tokio::test]
    async fn records_created_in_run_are_matched() {
        let store = MemoryDirectory::new();
        let summary = Synchronizer::new(&store, DEFAULT_PRIORITY)
            .unwrap()
            .sync(&[reporter("Jane Doe"), reporter("JANE DOE")], &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary, SyncSummary { added: 1, updated: 1, failed: 0 });
        assert_eq!(store.snapshot().len(), 1);
    }

    /// Fails every write for one reporter name.
    struct FlakyStore {
        inner: MemoryDirectory,
        fail_name: &'static str,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl DirectoryStore for FlakyStore {
        async fn list_all(&self) -> Result<Vec<DirectoryRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_all().await
        }

        async fn create(&self, fields: &Fields) -> Result<String> {
            if fields.get(FIELD_NAME).map(String::as_str) == Some(self.fail_name) {
                return Err(BylinesError::Storage("429 too many requests".into()));
            }
            self.inner.create(fields).await
        }

        async fn update(&self, id: &str, fields: &Fields) -> Result<()> {
            if fields.get(FIELD_NAME).map(String::as_str) == Some(self.fail_name) {
                return Err(BylinesError::Storage("connection reset".into()));
            }
            self.inner.update(id, fields).await
        }
    }

    #[tokio::test]
    async fn store_failure_is_isolated_to_one_reporter() {
        let store = FlakyStore {
            inner: MemoryDirectory::with_records(vec![record(
                "rec1",
                &[("reporter_name", "Old Timer")],
            )]),
            fail_name: "Jane Doe",
            list_calls: AtomicUsize::new(0),
        };
        let reporters = vec![reporter("Jane Doe"), reporter("John Roe"), reporter("Old Timer")];

        let summary = Synchronizer::new(&store, DEFAULT_PRIORITY)
            .unwrap()
            .sync(&reporters, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary, SyncSummary { added: 1, updated: 1, failed: 1 });
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1, "snapshot read once");
        assert_eq!(store.inner.snapshot().len(), 2);
    }

    #[test]
    fn empty_match_priority_is_config_error() {
        let store = MemoryDirectory::new();
        let err = Synchronizer::new(&store, &[]).err().expect("empty priority rejected");
        assert!(matches!(err, BylinesError::Config { .. }));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn fields_cover_every_slot() {
        let fields = to_fields(&reporter("Jane Doe"));
        for n in 1..=MAX_ARTICLES {
            assert_eq!(fields.get(&format!("pub_{n}_title")).map(String::as_str), Some(""));
        }
        assert_eq!(fields.get(FIELD_PROFILE_URL).map(String::as_str), Some(""));
    }
}
