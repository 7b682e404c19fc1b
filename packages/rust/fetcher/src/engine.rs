//! Dual-mode content fetcher.
//!
//! Static mode is a single GET with a browser-like user agent. Rendered mode
//! drives a headless browser session and waits for network quiescence; a
//! timeout on that wait still returns the DOM as it stands. Neither mode
//! retries; retry policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use bylines_shared::{BylinesError, FetchConfig, FetchMode, Result};

use crate::browser::{BrowserLauncher, BrowserSession, ChromeLauncher};

/// Wall-clock allowance on top of Chromium's virtual time budget for process
/// startup and the final DOM dump.
const CHROME_STARTUP_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// FetchedPage
// ---------------------------------------------------------------------------

/// Raw content retrieved for one URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the content was served from, after redirects.
    pub url: String,
    /// Document HTML. May be partial for rendered fetches.
    pub html: String,
    /// HTTP status for static fetches.
    pub status: Option<u16>,
    /// `false` when a rendered fetch gave up waiting for the page to settle.
    pub settled: bool,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Retrieves pages in static or rendered mode.
pub struct Fetcher {
    client: Client,
    launcher: Arc<dyn BrowserLauncher>,
    render_timeout: Duration,
}

impl Fetcher {
    /// Create a fetcher from the `[fetch]` config. Rendered mode uses local
    /// Chromium; `CHROME_BIN` overrides the configured binary.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.static_timeout_secs))
            .build()
            .map_err(|e| BylinesError::Network(format!("failed to build HTTP client: {e}")))?;

        // Chromium must run out of virtual time and dump its DOM before the
        // wall-clock wait gives up on it.
        let budget = Duration::from_secs(config.render_timeout_secs);
        let chrome_bin = std::env::var("CHROME_BIN").unwrap_or_else(|_| config.chrome_bin.clone());

        Ok(Self {
            client,
            launcher: Arc::new(ChromeLauncher::new(chrome_bin, budget)),
            render_timeout: budget + CHROME_STARTUP_GRACE,
        })
    }

    /// Replace the browser used for rendered fetches.
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Override the wall-clock wait for network quiescence.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Fetch `url` in the given mode.
    ///
    /// Any transport error, non-success status, or browser failure is a
    /// failure of this call only.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedPage> {
        let url = parse_http_url(url)?;
        match mode {
            FetchMode::Static => self.fetch_static(&url).await,
            FetchMode::Rendered => self.fetch_rendered(&url).await,
        }
    }

    /// Fetch, degrading any failure to `None` with a warning.
    pub async fn fetch_or_empty(&self, url: &str, mode: FetchMode) -> Option<FetchedPage> {
        match self.fetch(url, mode).await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!(url, error = %e, "fetch failed, continuing without content");
                None
            }
        }
    }

    async fn fetch_static(&self, url: &Url) -> Result<FetchedPage> {
        debug!(%url, "static fetch");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| BylinesError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BylinesError::Network(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| BylinesError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(FetchedPage {
            url: final_url,
            html,
            status: Some(status.as_u16()),
            settled: true,
        })
    }

    async fn fetch_rendered(&self, url: &Url) -> Result<FetchedPage> {
        debug!(%url, "rendered fetch");

        let mut session = self.launcher.launch().await?;
        let outcome = self.drive(session.as_mut(), url).await;

        if let Err(e) = session.close().await {
            warn!(%url, error = %e, "browser session did not close cleanly");
        }
        outcome
    }

    async fn drive(&self, session: &mut dyn BrowserSession, url: &Url) -> Result<FetchedPage> {
        session.navigate(url).await?;

        let settled =
            match tokio::time::timeout(self.render_timeout, session.wait_for_network_idle()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(%url, error = %e, "page did not settle, using partial content");
                    false
                }
                Err(_) => {
                    warn!(
                        %url,
                        timeout_ms = self.render_timeout.as_millis() as u64,
                        "network quiescence wait timed out, using partial content"
                    );
                    false
                }
            };

        let html = session.content().await?;
        Ok(FetchedPage {
            url: url.to_string(),
            html,
            status: None,
            settled,
        })
    }
}

/// Parse and require an http(s) URL.
fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| BylinesError::Network(format!("invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BylinesError::Network(format!(
            "only http/https URLs are fetched, got {other}: {raw}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config() -> FetchConfig {
        FetchConfig {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) BylinesTest/1.0".into(),
            static_timeout_secs: 2,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Static mode
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn static_fetch_sends_configured_user_agent() {
        let server = MockServer::start().await;
        let config = test_config();

        Mock::given(method("GET"))
            .and(path("/latest"))
            .and(header("user-agent", config.user_agent.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&config).unwrap();
        let page = fetcher
            .fetch(&format!("{}/latest", server.uri()), FetchMode::Static)
            .await
            .expect("fetch");

        assert_eq!(page.html, "<html>ok</html>");
        assert_eq!(page.status, Some(200));
        assert!(page.settled);
    }

    #[tokio::test]
    async fn static_non_success_is_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let err = fetcher
            .fetch(&format!("{}/gone", server.uri()), FetchMode::Static)
            .await
            .unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn static_timeout_is_failure_and_degrades_to_none() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = FetchConfig {
            static_timeout_secs: 1,
            ..Default::default()
        };
        let fetcher = Fetcher::new(&config).unwrap();
        let page = fetcher
            .fetch_or_empty(&format!("{}/slow", server.uri()), FetchMode::Static)
            .await;
        assert!(page.is_none());
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected() {
        let fetcher = Fetcher::new(&test_config()).unwrap();
        let err = fetcher
            .fetch("file:///etc/passwd", FetchMode::Static)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("only http/https"));
    }

    // -----------------------------------------------------------------------
    // Rendered mode
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct SessionLog {
        launched: usize,
        closed: usize,
    }

    /// Scripted browser: `settles` decides whether the quiescence wait ever
    /// resolves; `fail_navigation` makes navigate error out.
    struct FakeLauncher {
        dom: &'static str,
        settles: bool,
        fail_navigation: bool,
        log: Arc<Mutex<SessionLog>>,
    }

    struct FakeSession {
        dom: &'static str,
        settles: bool,
        fail_navigation: bool,
        log: Arc<Mutex<SessionLog>>,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
            self.log.lock().unwrap().launched += 1;
            Ok(Box::new(FakeSession {
                dom: self.dom,
                settles: self.settles,
                fail_navigation: self.fail_navigation,
                log: self.log.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        async fn navigate(&mut self, url: &Url) -> Result<()> {
            if self.fail_navigation {
                return Err(BylinesError::Render(format!("{url}: net::ERR_NAME_NOT_RESOLVED")));
            }
            Ok(())
        }

        async fn wait_for_network_idle(&mut self) -> Result<()> {
            if !self.settles {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn content(&mut self) -> Result<String> {
            Ok(self.dom.to_string())
        }

        async fn close(&mut self) -> Result<()> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    fn rendered_fetcher(launcher: FakeLauncher) -> Fetcher {
        Fetcher::new(&test_config())
            .unwrap()
            .with_launcher(Arc::new(launcher))
            .with_render_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn rendered_fetch_returns_settled_dom() {
        let log = Arc::new(Mutex::new(SessionLog::default()));
        let fetcher = rendered_fetcher(FakeLauncher {
            dom: "<html><body>full</body></html>",
            settles: true,
            fail_navigation: false,
            log: log.clone(),
        });

        let page = fetcher
            .fetch("https://news.example.com/latest", FetchMode::Rendered)
            .await
            .expect("rendered fetch");
        assert!(page.settled);
        assert!(page.html.contains("full"));
        assert_eq!(page.status, None);

        let log = log.lock().unwrap();
        assert_eq!((log.launched, log.closed), (1, 1));
    }

    #[tokio::test]
    async fn rendered_timeout_returns_partial_dom() {
        let log = Arc::new(Mutex::new(SessionLog::default()));
        let fetcher = rendered_fetcher(FakeLauncher {
            dom: "<html><body><article>first teaser</article></body></html>",
            settles: false,
            fail_navigation: false,
            log: log.clone(),
        });

        let page = fetcher
            .fetch("https://news.example.com/latest", FetchMode::Rendered)
            .await
            .expect("timeout on quiescence is not an error");
        assert!(!page.settled);
        assert!(page.html.contains("first teaser"));
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn rendered_navigation_failure_still_closes_session() {
        let log = Arc::new(Mutex::new(SessionLog::default()));
        let fetcher = rendered_fetcher(FakeLauncher {
            dom: "",
            settles: true,
            fail_navigation: true,
            log: log.clone(),
        });

        let err = fetcher
            .fetch("https://unreachable.example.com/", FetchMode::Rendered)
            .await
            .unwrap_err();
        assert!(err.is_fetch_failure());

        let log = log.lock().unwrap();
        assert_eq!((log.launched, log.closed), (1, 1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chromium_dom_dumped_at_budget_is_returned() {
        use std::os::unix::fs::PermissionsExt;

        // Stands in for a Chromium that only dumps once its 1s budget is spent.
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("slow-chromium");
        std::fs::write(
            &bin,
            concat!(
                "#!/bin/sh\nsleep 1.3\n",
                "echo '<html><body><article>partial teaser</article></body></html>'\n",
            ),
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = FetchConfig {
            render_timeout_secs: 1,
            ..test_config()
        };
        let budget = Duration::from_secs(config.render_timeout_secs);
        let fetcher = Fetcher::new(&config)
            .unwrap()
            .with_launcher(Arc::new(ChromeLauncher::new(bin.display().to_string(), budget)));
        assert!(fetcher.render_timeout > budget);

        let page = fetcher
            .fetch("https://news.example.com/latest", FetchMode::Rendered)
            .await
            .expect("rendered fetch");
        assert!(page.html.contains("partial teaser"), "got {:?}", page.html);
    }
}
