//! Application configuration for the byline directory sync.
//!
//! User config lives at `~/.bylines/bylines.toml`; `--config` overrides the
//! location. Each `[[sources]]` table is immutable per-source data, including
//! the static roster that seeds reconciliation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BylinesError, Result};
use crate::types::{Media, RosterEntry};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bylines.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bylines";

/// Browser-like user agent sent on static fetches.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Config structs (matching bylines.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fetcher settings shared by every source.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Directory store location and credentials.
    #[serde(default)]
    pub store: StoreConfig,

    /// Configured news sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Twitter/X user-search API used by `twitter-backfill` and `twitter-search`.
    #[serde(default)]
    pub twitter: TwitterConfig,
}

impl AppConfig {
    /// Look up a source by name (case-insensitive).
    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| BylinesError::validation(format!("unknown source '{name}'")))
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for static requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for a single static GET.
    #[serde(default = "default_static_timeout")]
    pub static_timeout_secs: u64,

    /// Budget for the network-quiescence wait in rendered mode.
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,

    /// Chromium executable for rendered mode (`CHROME_BIN` overrides).
    #[serde(default = "default_chrome_bin")]
    pub chrome_bin: String,

    /// Lower bound of the randomized politeness delay.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized politeness delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            static_timeout_secs: default_static_timeout(),
            render_timeout_secs: default_render_timeout(),
            chrome_bin: default_chrome_bin(),
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_static_timeout() -> u64 {
    10
}
fn default_render_timeout() -> u64 {
    20
}
fn default_chrome_bin() -> String {
    "chromium".into()
}
fn default_min_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    3000
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Local libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Remote libSQL URL. When set, `path` is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of the env var holding the remote auth token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub auth_token_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            url: None,
            auth_token_env: default_token_env(),
        }
    }
}

fn default_store_path() -> String {
    "~/.bylines/directory.db".into()
}
fn default_token_env() -> String {
    "BYLINES_STORE_TOKEN".into()
}

/// `[twitter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// API root; the user-search endpoint is `{api_url}/twitter/user/search`.
    #[serde(default = "default_twitter_api_url")]
    pub api_url: String,

    /// Name of the env var holding the API key, sent as `X-API-Key`.
    #[serde(default = "default_twitter_key_env")]
    pub api_key_env: String,

    /// Pause between API calls.
    #[serde(default = "default_twitter_delay")]
    pub delay_ms: u64,

    /// Upper bound on result pages followed per search query.
    #[serde(default = "default_twitter_max_pages")]
    pub max_pages: u32,

    /// Queries run by `twitter-search`.
    #[serde(default = "default_twitter_queries")]
    pub queries: Vec<String>,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_url: default_twitter_api_url(),
            api_key_env: default_twitter_key_env(),
            delay_ms: default_twitter_delay(),
            max_pages: default_twitter_max_pages(),
            queries: default_twitter_queries(),
        }
    }
}

fn default_twitter_api_url() -> String {
    "https://api.twitterapi.io".into()
}
fn default_twitter_key_env() -> String {
    "TWITTER_API_KEY".into()
}
fn default_twitter_delay() -> u64 {
    2000
}
fn default_twitter_max_pages() -> u32 {
    20
}
fn default_twitter_queries() -> Vec<String> {
    [
        "periodista Puerto Rico",
        "reportero Puerto Rico",
        "\"periodista PR\" OR \"reportero PR\"",
        "journalist puerto rico",
        "reporter puerto rico",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Read the Twitter/X API key from the configured env var.
pub fn twitter_api_key(twitter: &TwitterConfig) -> Result<String> {
    let var_name = &twitter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(BylinesError::config(format!(
            "Twitter/X API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// How a page is retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Single HTTP GET.
    #[default]
    Static,
    /// Headless browser navigation, waiting for network quiescence.
    Rendered,
}

/// Which observation attribute groups bylines into one reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Stable per-author URL, falling back to the name when a byline has none.
    #[default]
    ProfileUrl,
    /// Normalized display name only.
    DisplayName,
}

/// A lookup key used to match a reporter against existing directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    /// Twitter/X handle.
    Handle,
    /// Display name.
    Name,
    /// Email address.
    Email,
    /// Profile page URL.
    ProfileUrl,
}

/// `[[sources.aliases]]` entry: bylines matching `pattern` group under `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameAlias {
    /// Case-insensitive regular expression matched against the byline.
    pub pattern: String,
    /// Canonical display name.
    pub name: String,
}

/// `[sources.selectors]`: CSS selectors driving the generic extractor.
/// An absent selector means the field is never found on that page class.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// One element per article teaser on a listing page.
    pub listing_item: Option<String>,
    pub listing_author: Option<String>,
    pub listing_title: Option<String>,
    pub listing_link: Option<String>,
    pub listing_date: Option<String>,

    pub article_author: Option<String>,
    pub article_title: Option<String>,
    pub article_date: Option<String>,

    /// Container narrowing every other profile selector.
    pub profile_root: Option<String>,
    pub profile_name: Option<String>,
    pub profile_title: Option<String>,
    /// Links classified by host into contact channels.
    pub profile_social: Option<String>,
    pub profile_topics: Option<String>,
    pub profile_article: Option<String>,
    pub profile_article_title: Option<String>,
    pub profile_article_link: Option<String>,
    pub profile_article_date: Option<String>,
}

/// `[[sources]]` entry: one news outlet processed end-to-end per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Short identifier used on the command line.
    pub name: String,

    /// Listing page URL; `{page}` is replaced with the 1-based page number.
    pub listing_url: String,

    #[serde(default)]
    pub mode: FetchMode,

    #[serde(default)]
    pub identity: IdentityStrategy,

    /// Directory match keys, tried in order; first match wins.
    #[serde(default = "default_match_priority")]
    pub match_priority: Vec<MatchKey>,

    /// `chrono` format strings tried before the built-in date formats.
    #[serde(default)]
    pub date_formats: Vec<String>,

    /// Maximum listing pages to visit.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Visit each article page to read byline and date.
    #[serde(default)]
    pub follow_articles: bool,

    /// Visit each reporter's profile page for contacts and title.
    #[serde(default = "default_true")]
    pub fetch_profiles: bool,

    #[serde(default)]
    pub media: Media,

    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Known reporters, included even without recent bylines.
    #[serde(default)]
    pub roster: Vec<RosterEntry>,

    #[serde(default)]
    pub aliases: Vec<NameAlias>,
}

impl SourceConfig {
    /// Reject a source whose directory matching can never succeed.
    pub fn validate(&self) -> Result<()> {
        if self.match_priority.is_empty() {
            return Err(BylinesError::config(format!(
                "source '{}': match_priority must name at least one key",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_match_priority() -> Vec<MatchKey> {
    vec![MatchKey::Name, MatchKey::Email]
}
fn default_max_pages() -> u32 {
    1
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bylines/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| BylinesError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bylines/bylines.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BylinesError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| BylinesError::config(format!("failed to parse {}: {e}", path.display())))?;
    for source in &config.sources {
        source.validate()?;
    }
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BylinesError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BylinesError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BylinesError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the local store path, expanding a leading `~/`.
pub fn resolve_store_path(store: &StoreConfig) -> Result<PathBuf> {
    match store.path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| BylinesError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(&store.path)),
    }
}

/// Check that a remote store has its auth token available.
///
/// Returns the token for remote stores, `None` for local files. A missing
/// token is the one credential error that aborts a run at startup.
pub fn validate_store_credentials(store: &StoreConfig) -> Result<Option<String>> {
    if store.url.is_none() {
        if store.path.trim().is_empty() {
            return Err(BylinesError::config("store.path is empty and no store.url is set"));
        }
        return Ok(None);
    }

    let var_name = &store.auth_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(Some(val)),
        _ => Err(BylinesError::config(format!(
            "directory store token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_TOML: &str = r#"
[store]
path = "/tmp/bylines/directory.db"

[[sources]]
name = "vocero"
listing_url = "https://news.example.com/latest?page={page}"
mode = "rendered"
identity = "display_name"
match_priority = ["handle", "name", "email"]
date_formats = ["%d/%m/%Y"]
max_pages = 3

[sources.media]
name = "El Vocero"
type = "newspaper"
website = "https://news.example.com"

[sources.selectors]
listing_item = "article"
listing_author = ".byline a"

[[sources.roster]]
name = "Jane Doe"
url = "https://news.example.com/authors/jane/"

[[sources.aliases]]
pattern = "telemundo"
name = "TELEMUNDO"
"#;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("user_agent"));
        assert!(toml_str.contains("BYLINES_STORE_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.fetch.static_timeout_secs, 10);
        assert_eq!(parsed.store.auth_token_env, "BYLINES_STORE_TOKEN");
    }

    #[test]
    fn config_with_sources() {
        let config: AppConfig = toml::from_str(SOURCE_TOML).expect("parse");
        assert_eq!(config.sources.len(), 1);

        let source = config.source("VOCERO").expect("case-insensitive lookup");
        assert_eq!(source.mode, FetchMode::Rendered);
        assert_eq!(source.identity, IdentityStrategy::DisplayName);
        assert_eq!(
            source.match_priority,
            vec![MatchKey::Handle, MatchKey::Name, MatchKey::Email]
        );
        assert_eq!(source.media.kind, "newspaper");
        assert_eq!(source.roster[0].title, None);
        assert_eq!(source.aliases[0].name, "TELEMUNDO");
        assert!(source.fetch_profiles);
        assert!(!source.follow_articles);
    }

    #[test]
    fn source_defaults() {
        let toml_str = r#"
[[sources]]
name = "minimal"
listing_url = "https://example.com/"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let source = &config.sources[0];
        assert_eq!(source.mode, FetchMode::Static);
        assert_eq!(source.identity, IdentityStrategy::ProfileUrl);
        assert_eq!(source.match_priority, vec![MatchKey::Name, MatchKey::Email]);
        assert_eq!(source.max_pages, 1);
    }

    #[test]
    fn empty_match_priority_is_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bylines.toml");
        std::fs::write(
            &path,
            r#"
[[sources]]
name = "broken"
listing_url = "https://example.com/"
match_priority = []
"#,
        )
        .expect("write config");

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("match_priority"));
    }

    #[test]
    fn twitter_defaults_and_missing_key() {
        let config: AppConfig = toml::from_str("").expect("parse");
        assert_eq!(config.twitter.api_key_env, "TWITTER_API_KEY");
        assert_eq!(config.twitter.delay_ms, 2000);
        assert_eq!(config.twitter.queries.len(), 5);

        let twitter = TwitterConfig {
            api_key_env: "BYLINES_TEST_NONEXISTENT_TWITTER_KEY".into(),
            ..Default::default()
        };
        let err = twitter_api_key(&twitter).unwrap_err();
        assert!(err.to_string().contains("BYLINES_TEST_NONEXISTENT_TWITTER_KEY"));
    }

    #[test]
    fn unknown_source_is_validation_error() {
        let config = AppConfig::default();
        let err = config.source("nope").unwrap_err();
        assert!(err.to_string().contains("unknown source 'nope'"));
    }

    #[test]
    fn local_store_needs_no_token() {
        let store = StoreConfig::default();
        assert_eq!(validate_store_credentials(&store).expect("local ok"), None);
    }

    #[test]
    fn remote_store_requires_token() {
        let store = StoreConfig {
            url: Some("libsql://directory.example.com".into()),
            // Use a unique env var name to avoid interfering with other tests
            auth_token_env: "BYLINES_TEST_NONEXISTENT_TOKEN_12345".into(),
            ..Default::default()
        };
        let result = validate_store_credentials(&store);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }

    #[test]
    fn store_path_expands_home() {
        let store = StoreConfig {
            path: "~/.bylines/test.db".into(),
            ..Default::default()
        };
        let home = dirs::home_dir().expect("home dir");
        assert_eq!(
            resolve_store_path(&store).expect("home path"),
            home.join(".bylines/test.db")
        );
    }

    #[test]
    fn store_path_absolute_is_unchanged() {
        let store = StoreConfig {
            path: "/var/lib/bylines.db".into(),
            ..Default::default()
        };
        assert_eq!(
            resolve_store_path(&store).expect("absolute path"),
            PathBuf::from("/var/lib/bylines.db")
        );
    }
}
