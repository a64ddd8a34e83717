//! Live retrieval of hot-listing titles through the Reddit OAuth API.
//!
//! Uses the application-only client-credentials grant: one token request per
//! client, then one listing request per source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};
use url::Url;

use newsrouter_shared::{NewsRouterError, RedditConfig, RedditCredentials, Result};

/// Largest listing page Reddit serves.
pub const MAX_LISTING_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A live (remote) retrieval strategy.
///
/// Any `Err` is treated by the caller as "live unavailable" and resolved
/// through the fallback path. `Ok(vec![])` means the source exists but has
/// no content.
#[async_trait]
pub trait LiveSource: Send + Sync {
    /// Fetch at most `limit` item titles for `source`, in ranking order.
    async fn fetch_titles(&self, source: &str, limit: usize) -> Result<Vec<String>>;

    /// Human-readable name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
}

// ---------------------------------------------------------------------------
// RedditClient
// ---------------------------------------------------------------------------

/// Authenticated Reddit listing client.
pub struct RedditClient {
    client: Client,
    credentials: RedditCredentials,
    token_url: Url,
    api_base: String,
    token: OnceCell<String>,
}

impl RedditClient {
    /// Build a client from config endpoints and resolved credentials.
    pub fn new(config: &RedditConfig, credentials: RedditCredentials) -> Result<Self> {
        let token_url = Url::parse(&config.token_url).map_err(|e| {
            NewsRouterError::config(format!("invalid reddit.token_url '{}': {e}", config.token_url))
        })?;
        let api_base = Url::parse(&config.api_base).map_err(|e| {
            NewsRouterError::config(format!("invalid reddit.api_base '{}': {e}", config.api_base))
        })?;

        // Non-existent subreddits answer with a redirect to search; never follow it.
        let client = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NewsRouterError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            token_url,
            api_base: api_base.as_str().trim_end_matches('/').to_string(),
            token: OnceCell::new(),
        })
    }

    /// Bearer token, requested on first use and shared afterwards.
    async fn access_token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| self.request_token())
            .await?;
        Ok(token.as_str())
    }

    async fn request_token(&self) -> Result<String> {
        debug!(url = %self.token_url, "requesting reddit access token");

        let response = self
            .client
            .post(self.token_url.as_str())
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| NewsRouterError::Network(format!("token request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsRouterError::Network(format!(
                "token request: HTTP {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| NewsRouterError::parse(format!("token response: {e}")))?;

        match (body.access_token, body.error) {
            (Some(token), _) if !token.is_empty() => {
                info!("reddit access token acquired");
                Ok(token)
            }
            (_, Some(error)) => Err(NewsRouterError::Network(format!(
                "token request rejected: {error}"
            ))),
            _ => Err(NewsRouterError::parse("token response has no access_token")),
        }
    }
}

#[async_trait]
impl LiveSource for RedditClient {
    #[instrument(skip(self), fields(live = "reddit"))]
    async fn fetch_titles(&self, source: &str, limit: usize) -> Result<Vec<String>> {
        if !is_valid_subreddit(source) {
            return Err(NewsRouterError::validation(format!(
                "'{source}' is not a valid subreddit name"
            )));
        }

        let token = self.access_token().await?;
        let url = format!("{}/r/{source}/hot", self.api_base);
        let limit = limit.clamp(1, MAX_LISTING_LIMIT);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", limit.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await
            .map_err(|e| NewsRouterError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsRouterError::Network(format!("{url}: HTTP {status}")));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| NewsRouterError::parse(format!("{url}: invalid listing: {e}")))?;

        let titles: Vec<String> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.title)
            .take(limit)
            .collect();

        debug!(count = titles.len(), "listing fetched");
        Ok(titles)
    }

    fn name(&self) -> &str {
        "reddit"
    }
}

/// Subreddit names are ASCII letters, digits and underscores.
fn is_valid_subreddit(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> RedditCredentials {
        RedditCredentials {
            client_id: "test-id".into(),
            client_secret: "test-secret".into(),
            user_agent: "newsrouter-test/0.1".into(),
        }
    }

    fn config_for(server: &MockServer) -> RedditConfig {
        RedditConfig {
            token_url: format!("{}/api/v1/access_token", server.uri()),
            api_base: server.uri(),
            timeout_secs: 5,
            ..RedditConfig::default()
        }
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-123",
                "token_type": "bearer",
                "expires_in": 86400
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn listing(titles: &[&str]) -> serde_json::Value {
        let children: Vec<_> = titles
            .iter()
            .map(|t| serde_json::json!({ "kind": "t3", "data": { "title": t } }))
            .collect();
        serde_json::json!({ "kind": "Listing", "data": { "children": children } })
    }

    #[test]
    fn subreddit_name_validation() {
        assert!(is_valid_subreddit("worldnews"));
        assert!(is_valid_subreddit("Unity3D"));
        assert!(is_valid_subreddit("ask_science"));
        assert!(!is_valid_subreddit("zzzzz-unknown"));
        assert!(!is_valid_subreddit("../etc"));
        assert!(!is_valid_subreddit(""));
    }

    #[tokio::test]
    async fn fetches_hot_titles_in_order() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/r/worldnews/hot"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["first", "second"])))
            .mount(&server)
            .await;

        let client = RedditClient::new(&config_for(&server), credentials()).unwrap();
        let titles = client.fetch_titles("worldnews", 2).await.unwrap();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn token_is_reused_across_fetches() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["x"])))
            .mount(&server)
            .await;

        let client = RedditClient::new(&config_for(&server), credentials()).unwrap();
        client.fetch_titles("news", 1).await.unwrap();
        client.fetch_titles("sports", 1).await.unwrap();
        // `expect(1)` on the token mock is verified when the server drops.
    }

    #[tokio::test]
    async fn empty_listing_is_ok_and_empty() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/r/quiet/hot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[])))
            .mount(&server)
            .await;

        let client = RedditClient::new(&config_for(&server), credentials()).unwrap();
        let titles = client.fetch_titles("quiet", 5).await.unwrap();
        assert!(titles.is_empty());
    }

    #[tokio::test]
    async fn redirect_to_search_is_an_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/r/doesnotexist/hot"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/subreddits/search.json?q=doesnotexist"),
            )
            .mount(&server)
            .await;

        let client = RedditClient::new(&config_for(&server), credentials()).unwrap();
        let err = client.fetch_titles("doesnotexist", 3).await.unwrap_err();
        assert!(err.to_string().contains("302"));
    }

    #[tokio::test]
    async fn rejected_credentials_are_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = RedditClient::new(&config_for(&server), credentials()).unwrap();
        let err = client.fetch_titles("news", 3).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn malformed_listing_is_a_parse_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/r/news/hot"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let client = RedditClient::new(&config_for(&server), credentials()).unwrap();
        let err = client.fetch_titles("news", 3).await.unwrap_err();
        assert!(matches!(err, NewsRouterError::Parse { .. }));
    }

    #[test]
    fn invalid_endpoint_is_a_config_error() {
        let config = RedditConfig {
            api_base: "not a url".into(),
            ..RedditConfig::default()
        };
        let err = RedditClient::new(&config, credentials()).err().expect("config error");
        assert!(err.to_string().contains("reddit.api_base"));
    }
}
