//! Progress callbacks for long-running source runs.

use crate::pipeline::RunSummary;
use crate::sync::SyncOutcome;

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each listing page is fetched.
    fn page_fetched(&self, url: &str, page: u32, observations: usize);
    /// Called after each reporter's store write (or failure).
    fn reporter_synced(&self, name: &str, outcome: &SyncOutcome);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_fetched(&self, _url: &str, _page: u32, _observations: usize) {}
    fn reporter_synced(&self, _name: &str, _outcome: &SyncOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}
