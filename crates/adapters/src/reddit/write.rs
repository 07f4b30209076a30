//! Reddit write adapter: comment replies on submissions

use super::{RedditClient, RedditError};
use async_trait::async_trait;
use carelead_domain::{OutreachSendError, ReplyReceipt, ReplySender};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Added on top of Reddit's own cool-down estimate
const RATELIMIT_BUFFER: Duration = Duration::from_secs(5);

static RATELIMIT_WAIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(minute|second)").expect("valid ratelimit regex"));

/// Replies to posts as the configured Reddit user
pub struct RedditReplier {
    client: Arc<RedditClient>,
}

impl RedditReplier {
    pub fn new(client: Arc<RedditClient>) -> Self {
        Self { client }
    }

    async fn comment(&self, post_id: &str, message: &str) -> Result<ReplyReceipt, RedditError> {
        let thing_id = format!("t3_{}", post_id);
        let form = [
            ("api_type", "json"),
            ("thing_id", thing_id.as_str()),
            ("text", message),
        ];

        let response = self
            .client
            .send(self.client.post("/api/comment").form(&form))
            .await?;

        let body: CommentResponse = response
            .json()
            .await
            .map_err(|e| RedditError::Api(format!("Invalid comment response: {}", e)))?;

        if let Some(error) = body.json.errors.first() {
            return Err(comment_error(error));
        }

        let name = body
            .json
            .data
            .and_then(|data| data.things.into_iter().next())
            .map(|thing| thing.data.name)
            .ok_or_else(|| RedditError::Api("Comment response had no thing".to_string()))?;

        Ok(ReplyReceipt { id: name })
    }
}

#[async_trait]
impl ReplySender for RedditReplier {
    async fn reply(&self, post_id: &str, message: &str) -> Result<ReplyReceipt, OutreachSendError> {
        if !self.client.can_reply() {
            return Err(OutreachSendError::Auth(
                "Replying needs a Reddit username and password".to_string(),
            ));
        }

        let receipt = self.comment(post_id, message).await?;
        tracing::info!(post_id, reply_id = %receipt.id, "Posted Reddit reply");
        Ok(receipt)
    }
}

/// Map one `[code, message, field]` entry from `json.errors`
fn comment_error(error: &[Value]) -> RedditError {
    let code = error.first().and_then(Value::as_str).unwrap_or_default();
    let message = error.get(1).and_then(Value::as_str).unwrap_or_default();

    match code {
        "RATELIMIT" => RedditError::RateLimited(parse_ratelimit_wait(message)),
        "USER_REQUIRED" | "NOT_AUTHORIZED" => {
            RedditError::Auth(format!("{}: {}", code, message))
        }
        _ => RedditError::Api(format!("{}: {}", code, message)),
    }
}

/// Read "take a break for 3 minutes" style hints
fn parse_ratelimit_wait(message: &str) -> Option<Duration> {
    let caps = RATELIMIT_WAIT_RE.captures(message)?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    let secs = if caps.get(2)?.as_str().eq_ignore_ascii_case("minute") {
        amount * 60
    } else {
        amount
    };
    Some(Duration::from_secs(secs) + RATELIMIT_BUFFER)
}

#[derive(Deserialize)]
struct CommentResponse {
    json: CommentJson,
}

#[derive(Deserialize)]
struct CommentJson {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    data: Option<CommentData>,
}

#[derive(Deserialize)]
struct CommentData {
    #[serde(default)]
    things: Vec<CommentThing>,
}

#[derive(Deserialize)]
struct CommentThing {
    data: CommentThingData,
}

#[derive(Deserialize)]
struct CommentThingData {
    name: String,
}
