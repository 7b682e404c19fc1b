//! Client for the twitterapi.io user-search endpoint.
//!
//! Every call is preceded by a politeness pause except the first, and
//! authenticated with the `X-API-Key` header.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use bylines_shared::{BylinesError, Result, TwitterConfig};

use crate::politeness::Politeness;

const SEARCH_PATH: &str = "/twitter/user/search";

/// A user returned by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TwitterUser {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub screen_name: String,
    pub description: String,
}

impl TwitterUser {
    /// Profile URL on x.com, if the user has a screen name.
    pub fn profile_url(&self) -> Option<String> {
        let handle = self.screen_name.trim().trim_start_matches('@');
        (!handle.is_empty()).then(|| format!("https://x.com/{handle}"))
    }
}

/// User ids arrive as strings or bare numbers.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
        Missing(Option<()>),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
        Id::Missing(_) => String::new(),
    })
}

/// One page of search results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserPage {
    pub users: Vec<TwitterUser>,
    pub has_next_page: bool,
    pub next_cursor: Option<String>,
}

/// Searches Twitter/X users by free text.
pub struct TwitterClient {
    client: Client,
    search_url: String,
    api_key: String,
    politeness: Politeness,
    started: AtomicBool,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BylinesError::Network(format!("failed to build HTTP client: {e}")))?;
        let delay = Duration::from_millis(config.delay_ms);

        Ok(Self {
            client,
            search_url: format!("{}{SEARCH_PATH}", config.api_url.trim_end_matches('/')),
            api_key,
            politeness: Politeness::new(delay, delay),
            started: AtomicBool::new(false),
        })
    }

    /// Replace the pause taken between calls.
    pub fn with_politeness(mut self, politeness: Politeness) -> Self {
        self.politeness = politeness;
        self
    }

    /// Fetch one page of users matching `query`.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, cursor: Option<&str>) -> Result<UserPage> {
        if self.started.swap(true, Ordering::SeqCst) {
            self.politeness.pause().await;
        }

        let mut request = self
            .client
            .get(&self.search_url)
            .header("X-API-Key", &self.api_key)
            .query(&[("query", query)]);
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            request = request.query(&[("cursor", cursor)]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| BylinesError::Network(format!("user search '{query}': {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BylinesError::Network(format!(
                "user search '{query}': HTTP {status}: {body}"
            )));
        }

        let page: UserPage = resp
            .json()
            .await
            .map_err(|e| BylinesError::parse(format!("user search '{query}': {e}")))?;
        debug!(users = page.users.len(), has_next = page.has_next_page, "search page");
        Ok(page)
    }

    /// Best match for a person's name: the first user returned.
    pub async fn find_user(&self, name: &str) -> Result<Option<TwitterUser>> {
        let page = self.search(name, None).await?;
        Ok(page.users.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
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

    #[tokio::test]
    async fn search_sends_key_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/twitter/user/search"))
            .and(header("X-API-Key", "test-key"))
            .and(query_param("query", "reportero"))
            .and(query_param("cursor", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [{"id": "42", "name": "Jane Doe", "screen_name": "janedoe"}],
                "has_next_page": true,
                "next_cursor": "def"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server).search("reportero", Some("abc")).await.unwrap();
        assert_eq!(page.users.len(), 1);
        assert_eq!(page.users[0].profile_url().as_deref(), Some("https://x.com/janedoe"));
        assert!(page.has_next_page);
        assert_eq!(page.next_cursor.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn find_user_with_no_results_is_none() {
        let server = MockServer::start().await;
        Mock::given(path("/twitter/user/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": []
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).find_user("Nobody Here").await.unwrap(), None);
    }

    #[tokio::test]
    async fn api_error_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/twitter/user/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client(&server).find_user("Jane Doe").await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn numeric_and_missing_ids_deserialize() {
        let page: UserPage = serde_json::from_str(
            r#"{"users": [{"id": 42, "screen_name": "a"}, {"id": null, "screen_name": "b"}]}"#,
        )
        .unwrap();
        assert_eq!(page.users[0].id, "42");
        assert_eq!(page.users[1].id, "");
        assert!(!page.has_next_page);
    }

    #[test]
    fn profile_url_needs_screen_name() {
        let user = TwitterUser {
            name: "Jane Doe".into(),
            ..Default::default()
        };
        assert_eq!(user.profile_url(), None);
    }
}
