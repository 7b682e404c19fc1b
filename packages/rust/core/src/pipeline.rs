//! End-to-end source run: listings → observations → reporters → directory.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use bylines_fetcher::{Extractor, FetchedPage, Fetcher, Pagination, Politeness, SelectorExtractor};
use bylines_shared::{
    FetchConfig, FetchMode, Observation, ProfileFragment, Reporter, Result, SourceConfig,
};
use bylines_storage::DirectoryStore;

use crate::progress::ProgressReporter;
use crate::reconcile::{ProfileSource, Reconciler};
use crate::sync::{SyncSummary, Synchronizer};

/// Configuration for one source run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The source to process.
    pub source: SourceConfig,
    /// Fetcher settings.
    pub fetch: FetchConfig,
    /// Stop after profile augmentation; nothing is written.
    pub dry_run: bool,
}

/// Result of a source run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub source: String,
    /// Listing pages that returned content.
    pub pages: usize,
    pub observations: usize,
    /// Network requests made, listing, article and profile pages included.
    pub requests: usize,
    pub reporters: Vec<Reporter>,
    pub sync: SyncSummary,
    pub dry_run: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Run one source end-to-end with the default fetcher and extractor.
pub async fn run_source(
    config: &RunConfig,
    store: &dyn DirectoryStore,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    SourceRunner::new(config)?.run(store, progress).await
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Owns the fetch and extraction plumbing for one source.
pub struct SourceRunner<'a> {
    config: &'a RunConfig,
    client: Arc<PoliteClient>,
    extractor: Arc<dyn Extractor>,
}

impl<'a> SourceRunner<'a> {
    /// Build the fetcher, politeness delay, and selector extractor from config.
    pub fn new(config: &'a RunConfig) -> Result<Self> {
        config.source.validate()?;
        let fetcher = Fetcher::new(&config.fetch)?;
        let extractor = SelectorExtractor::from_config(&config.source)?;
        Ok(Self {
            config,
            client: Arc::new(PoliteClient::new(
                fetcher,
                Politeness::from(&config.fetch),
                config.source.mode,
            )),
            extractor: Arc::new(extractor),
        })
    }

    /// Replace the fetcher and politeness delay.
    pub fn with_fetcher(mut self, fetcher: Fetcher, politeness: Politeness) -> Self {
        self.client = Arc::new(PoliteClient::new(fetcher, politeness, self.config.source.mode));
        self
    }

    /// Replace the extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Fetch, reconcile, and (unless dry-run) synchronize.
    #[instrument(skip_all, fields(source = %self.config.source.name))]
    pub async fn run(
        &self,
        store: &dyn DirectoryStore,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let source = &self.config.source;
        info!(listing = %source.listing_url, mode = ?source.mode, "starting source run");

        // Reconciler first so a bad alias pattern fails before any request.
        let reconciler = Reconciler::new(source)?;

        // --- Phase 1: Listings ---
        progress.phase("Fetching listings");
        let (mut observations, pages) = self.collect_listings(progress).await;

        // --- Phase 2: Article pages ---
        if source.follow_articles && !observations.is_empty() {
            progress.phase("Reading article pages");
            self.follow_articles(&mut observations).await;
        }
        let observation_count = observations.len();

        // --- Phase 3: Reconcile ---
        progress.phase("Reconciling reporters");
        let mut reporters = reconciler.reconcile(observations);
        reconciler.augment_roster(&mut reporters);

        // --- Phase 4: Profiles ---
        if source.fetch_profiles {
            progress.phase("Reading profile pages");
            let profiles = FetchingProfileSource {
                client: Arc::clone(&self.client),
                extractor: Arc::clone(&self.extractor),
            };
            reconciler.augment_profiles(&mut reporters, &profiles).await;
        }

        // --- Phase 5: Sync ---
        let sync = if self.config.dry_run {
            info!(reporters = reporters.len(), "dry run, skipping directory sync");
            SyncSummary::default()
        } else {
            progress.phase("Synchronizing directory");
            Synchronizer::new(store, &source.match_priority)?
                .sync(&reporters, progress)
                .await?
        };

        let summary = RunSummary {
            source: source.name.clone(),
            pages,
            observations: observation_count,
            requests: self.client.requests(),
            reporters,
            sync,
            dry_run: self.config.dry_run,
            elapsed: start.elapsed(),
        };

        info!(
            pages = summary.pages,
            observations = summary.observations,
            reporters = summary.reporters.len(),
            added = summary.sync.added,
            updated = summary.sync.updated,
            failed = summary.sync.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "source run complete"
        );
        progress.done(&summary);
        Ok(summary)
    }

    /// Walk listing pages until the cap, a failed fetch, or a page that adds
    /// nothing new.
    async fn collect_listings(&self, progress: &dyn ProgressReporter) -> (Vec<Observation>, usize) {
        let source = &self.config.source;
        let mut pagination = Pagination::new(source.listing_url.clone(), source.max_pages);
        let mut observations = Vec::new();
        let mut seen_links: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        while let Some(page_url) = pagination.next() {
            let Some(page) = self.client.get(&page_url).await else {
                pagination.stop();
                continue;
            };
            let Some(base) = page_base(&page) else {
                pagination.stop();
                continue;
            };
            pages += 1;

            let found = self.extractor.listing(&page.html, &base);
            let before = observations.len();
            for obs in found {
                let new_link = seen_links.insert(obs.article.link.clone());
                let new_pair = new_link
                    || !observations.iter().any(|o: &Observation| {
                        o.article.link == obs.article.link && o.author_name == obs.author_name
                    });
                if new_pair {
                    observations.push(obs);
                }
            }
            let added = observations.len() - before;
            progress.page_fetched(&page_url, pagination.current_page(), added);
            debug!(url = %page_url, added, settled = page.settled, "listing page processed");

            if added == 0 {
                pagination.stop();
            }
        }
        (observations, pages)
    }

    /// Read byline, title and date from each article page. The article page
    /// wins where it has a value; a failed fetch keeps the listing data.
    async fn follow_articles(&self, observations: &mut [Observation]) {
        let mut visited: HashSet<String> = HashSet::new();
        for obs in observations.iter_mut() {
            if !visited.insert(obs.article.link.clone()) {
                continue;
            }
            let Some(page) = self.client.get(&obs.article.link).await else {
                continue;
            };
            let Some(base) = page_base(&page) else {
                continue;
            };
            let details = self.extractor.article(&page.html, &base);

            if !details.author_name.trim().is_empty() {
                obs.author_name = details.author_name;
                if details.author_url.is_some() {
                    obs.author_url = details.author_url;
                }
            }
            if obs.article.title.is_empty() {
                obs.article.title = details.title;
            }
            if !details.date.is_empty() {
                obs.article.date = details.date;
            }
        }
    }
}

fn page_base(page: &FetchedPage) -> Option<Url> {
    match Url::parse(&page.url) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(url = %page.url, error = %e, "fetched page has an unusable URL");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Polite fetching
// ---------------------------------------------------------------------------

/// Fetcher wrapper that waits a randomized delay before every request but
/// the first, and degrades failures to `None`.
struct PoliteClient {
    fetcher: Fetcher,
    politeness: Politeness,
    mode: FetchMode,
    started: AtomicBool,
    requests: AtomicUsize,
}

impl PoliteClient {
    fn new(fetcher: Fetcher, politeness: Politeness, mode: FetchMode) -> Self {
        Self {
            fetcher,
            politeness,
            mode,
            started: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    async fn get(&self, url: &str) -> Option<FetchedPage> {
        if self.started.swap(true, Ordering::SeqCst) {
            self.politeness.pause().await;
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.fetcher.fetch_or_empty(url, self.mode).await
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Profile pages fetched and extracted with the source's own plumbing.
struct FetchingProfileSource {
    client: Arc<PoliteClient>,
    extractor: Arc<dyn Extractor>,
}

#[async_trait]
impl ProfileSource for FetchingProfileSource {
    async fn profile(&self, url: &str) -> Option<ProfileFragment> {
        let page = self.client.get(url).await?;
        let base = page_base(&page)?;
        Some(self.extractor.profile(&page.html, &base))
    }
}
