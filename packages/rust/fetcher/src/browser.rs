//! Headless browser sessions for rendered fetches.
//!
//! A session goes through `navigate → wait_for_network_idle → content →
//! close`. The [`Fetcher`](crate::Fetcher) bounds the wait and always calls
//! `close`, so implementations only need to make each step honest.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use bylines_shared::{BylinesError, Result};

/// Starts isolated browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a fresh session with no state shared with earlier ones.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One isolated browser instance showing a single page.
#[async_trait]
pub trait BrowserSession: Send {
    /// Begin loading `url`.
    async fn navigate(&mut self, url: &Url) -> Result<()>;

    /// Resolve once the page's network activity has settled.
    /// Must be cancel-safe: the caller may drop it on timeout.
    async fn wait_for_network_idle(&mut self) -> Result<()>;

    /// Serialized DOM as it currently stands.
    async fn content(&mut self) -> Result<String>;

    /// Tear the session down. Called exactly once, on every path.
    async fn close(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Local Chromium
// ---------------------------------------------------------------------------

/// Launches headless Chromium processes with a throwaway profile directory.
pub struct ChromeLauncher {
    bin: String,
    virtual_time_budget: Duration,
}

impl ChromeLauncher {
    /// `virtual_time_budget` caps how long Chromium waits for the page to go
    /// quiet before dumping whatever DOM it has.
    pub fn new(bin: impl Into<String>, virtual_time_budget: Duration) -> Self {
        Self {
            bin: bin.into(),
            virtual_time_budget,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let profile = tempfile::tempdir()
            .map_err(|e| BylinesError::Render(format!("failed to create profile dir: {e}")))?;
        debug!(bin = %self.bin, profile = %profile.path().display(), "launching chromium session");

        Ok(Box::new(ChromeSession {
            bin: self.bin.clone(),
            budget_ms: self.virtual_time_budget.as_millis(),
            profile: Some(profile),
            child: None,
            stdout: None,
            exited: false,
            dom: None,
        }))
    }
}

/// A single `chromium --dump-dom` run.
///
/// `--dump-dom` prints the document only once the page settles or the
/// virtual time budget runs out, so a session abandoned before that point
/// yields an empty document rather than an error.
struct ChromeSession {
    bin: String,
    budget_ms: u128,
    profile: Option<TempDir>,
    child: Option<Child>,
    stdout: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    exited: bool,
    dom: Option<String>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &Url) -> Result<()> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| BylinesError::Render("session already closed".into()))?;

        let mut child = Command::new(&self.bin)
            .args([
                "--headless",
                "--no-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                &format!("--user-data-dir={}", profile.path().display()),
                &format!("--virtual-time-budget={}", self.budget_ms),
                "--dump-dom",
                url.as_str(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BylinesError::Render(format!("failed to launch {}: {e}", self.bin)))?;

        if let Some(mut out) = child.stdout.take() {
            self.stdout = Some(tokio::spawn(async move {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).await?;
                Ok(buf)
            }));
        }
        self.child = Some(child);
        Ok(())
    }

    async fn wait_for_network_idle(&mut self) -> Result<()> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| BylinesError::Render("navigate was not called".into()))?;

        let status = child
            .wait()
            .await
            .map_err(|e| BylinesError::Render(format!("waiting on chromium failed: {e}")))?;
        self.exited = true;

        if !status.success() {
            return Err(BylinesError::Render(format!("chromium exited with {status}")));
        }
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        if let Some(dom) = &self.dom {
            return Ok(dom.clone());
        }

        let ready = self.exited || self.stdout.as_ref().is_some_and(|h| h.is_finished());
        if !ready {
            return Ok(String::new());
        }

        let dom = match self.stdout.take() {
            Some(handle) => match handle.await {
                Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Err(e)) => {
                    return Err(BylinesError::Render(format!("reading chromium output: {e}")));
                }
                Err(e) => return Err(BylinesError::Render(format!("output task failed: {e}"))),
            },
            None => String::new(),
        };
        self.dom = Some(dom.clone());
        Ok(dom)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.stdout.take() {
            handle.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill chromium");
                }
            }
        }
        if let Some(profile) = self.profile.take() {
            profile
                .close()
                .map_err(|e| BylinesError::Render(format!("failed to remove profile dir: {e}")))?;
        }
        Ok(())
    }
}
