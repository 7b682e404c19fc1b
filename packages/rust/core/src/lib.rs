//! Reconciliation and synchronization engine for the byline directory.
//!
//! This crate ties together fetching, extraction, reconciliation, and the
//! directory store into one end-to-end source run (see [`run_source`]),
//! plus Twitter/X enrichment of the directory (see [`backfill_twitter`]).

pub mod dates;
pub mod identity;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod sync;
pub mod twitter;

pub use pipeline::{RunConfig, RunSummary, SourceRunner, run_source};
pub use progress::{ProgressReporter, SilentProgress};
pub use reconcile::{ProfileSource, Reconciler, order_articles};
pub use sync::{SyncOutcome, SyncSummary, Synchronizer};
pub use twitter::{
    BackfillSummary, SearchSummary, backfill_twitter, search_reporters, sync_search_results,
};
