//! Reddit API adapters
//!
//! `RedditClient` owns the OAuth token and the HTTP plumbing; `RedditPostSource`
//! and `RedditReplier` implement the read and reply ports on top of it.

mod read;
mod write;

pub use read::{RedditPostSource, RedditSourceConfig};
pub use write::RedditReplier;

use async_trait::async_trait;
use carelead_domain::{
    OutreachSendError, Post, PostSource, PostSourceError, PostStream, ReplyReceipt, ReplySender,
    Retryable,
};
use futures::stream;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const AUTH_URL: &str = "https://www.reddit.com";
const API_URL: &str = "https://oauth.reddit.com";

/// Refresh the token this long before Reddit says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and connection settings for the Reddit API
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub user_agent: String,
    /// Username and password for the password grant; needed to reply
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub timeout_secs: u64,
}

impl RedditCredentials {
    pub fn can_reply(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Errors from a single Reddit API call
#[derive(Debug, thiserror::Error)]
pub(crate) enum RedditError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<Duration>),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error: {0}")]
    Server(String),
    /// 403/404: a private, banned or missing subreddit or thing
    #[error("Not accessible: {0}")]
    Inaccessible(String),
    #[error("API error: {0}")]
    Api(String),
}

impl Retryable for RedditError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            RedditError::RateLimited(_) | RedditError::Network(_) | RedditError::Server(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditError::RateLimited(hint) => *hint,
            _ => None,
        }
    }
}

impl From<RedditError> for PostSourceError {
    fn from(error: RedditError) -> Self {
        match error {
            RedditError::Auth(msg) => PostSourceError::Auth(msg),
            RedditError::RateLimited(hint) => PostSourceError::RateLimited(hint),
            RedditError::Network(msg) => PostSourceError::Network(msg),
            RedditError::Server(msg) => PostSourceError::Server(msg),
            RedditError::Inaccessible(msg) | RedditError::Api(msg) => PostSourceError::Api(msg),
        }
    }
}

impl From<RedditError> for OutreachSendError {
    fn from(error: RedditError) -> Self {
        match error {
            RedditError::Auth(msg) => OutreachSendError::Auth(msg),
            RedditError::RateLimited(hint) => OutreachSendError::RateLimited(hint),
            RedditError::Network(msg) => OutreachSendError::Network(msg),
            RedditError::Server(msg) | RedditError::Inaccessible(msg) | RedditError::Api(msg) => {
                OutreachSendError::Api(msg)
            }
        }
    }
}

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

/// Authenticated Reddit API client shared by the source and the replier
pub struct RedditClient {
    client: Client,
    credentials: RedditCredentials,
    auth_url: String,
    api_url: String,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Self {
        Self::with_base_urls(credentials, AUTH_URL.to_string(), API_URL.to_string())
    }

    pub fn with_base_urls(credentials: RedditCredentials, auth_url: String, api_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(credentials.timeout_secs))
            .user_agent(credentials.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build Reddit HTTP client, using defaults");
                Client::new()
            });

        Self {
            client,
            credentials,
            auth_url,
            api_url,
            token: tokio::sync::Mutex::new(None),
        }
    }

    pub fn can_reply(&self) -> bool {
        self.credentials.can_reply()
    }

    /// Bearer token, fetched or refreshed as needed
    async fn access_token(&self) -> Result<SecretString, RedditError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let mut form = vec![];
        match (&self.credentials.username, &self.credentials.password) {
            (Some(username), Some(password)) => {
                form.push(("grant_type", "password".to_string()));
                form.push(("username", username.clone()));
                form.push(("password", password.expose_secret().to_string()));
            }
            _ => form.push(("grant_type", "client_credentials".to_string())),
        }

        let response = self
            .client
            .post(format!("{}/api/v1/access_token", self.auth_url))
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RedditError::Api(format!("Invalid token response: {}", e)))?;

        let Some(access_token) = body.access_token else {
            return Err(RedditError::Auth(
                body.error.unwrap_or_else(|| "no access token returned".to_string()),
            ));
        };

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        let value = SecretString::from(access_token);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });

        tracing::debug!(
            user_context = self.credentials.can_reply(),
            expires_in_secs = lifetime.as_secs(),
            "Obtained Reddit access token"
        );
        Ok(value)
    }

    /// Send an authenticated request, dropping the cached token on 401
    async fn send(&self, request: RequestBuilder) -> Result<Response, RedditError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(network_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            *self.token.lock().await = None;
        }
        check_status(response).await
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(format!("{}{}", self.api_url, path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}{}", self.api_url, path))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

fn network_error(e: reqwest::Error) -> RedditError {
    RedditError::Network(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, RedditError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        return Err(RedditError::Auth(format!("{}: {}", status, body)));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("x-ratelimit-reset")
            .or_else(|| response.headers().get("retry-after"))
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(|secs| Duration::from_secs_f64(secs.max(0.0)));
        return Err(RedditError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{}: {}", status, body);
    if status.is_server_error() {
        Err(RedditError::Server(message))
    } else if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
        Err(RedditError::Inaccessible(message))
    } else {
        Err(RedditError::Api(message))
    }
}

/// Stub post source for offline runs and tests
pub struct StubPostSource {
    posts: Vec<Post>,
}

impl StubPostSource {
    pub fn empty() -> Self {
        Self { posts: vec![] }
    }

    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    /// Load posts from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PostSourceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PostSourceError::Unavailable {
                attempts: 1,
                message: format!("Failed to read {}: {}", path.display(), e),
            }
        })?;
        let posts = serde_json::from_str(&content)
            .map_err(|e| PostSourceError::Api(format!("Invalid posts file: {}", e)))?;
        Ok(Self { posts })
    }
}

impl PostSource for StubPostSource {
    fn fetch_candidates<'a>(&'a self, channels: &'a [String], limit: usize) -> PostStream<'a> {
        let posts = self
            .posts
            .iter()
            .filter(move |p| {
                channels.is_empty()
                    || channels.iter().any(|c| c.eq_ignore_ascii_case(&p.channel))
            })
            .take(limit)
            .cloned()
            .map(Ok);
        Box::pin(stream::iter(posts))
    }
}

/// Stub replier that records messages instead of posting them
pub struct StubReplier {
    sent: Mutex<Vec<(String, String)>>,
}

impl StubReplier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(vec![]),
        }
    }

    /// All replies "sent" so far
    pub fn get_sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Default for StubReplier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplySender for StubReplier {
    async fn reply(&self, post_id: &str, message: &str) -> Result<ReplyReceipt, OutreachSendError> {
        self.sent
            .lock()
            .map_err(|e| OutreachSendError::Api(e.to_string()))?
            .push((post_id.to_string(), message.to_string()));

        Ok(ReplyReceipt {
            id: format!("stub_{}", post_id),
        })
    }
}
