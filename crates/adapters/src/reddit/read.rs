//! Reddit read adapter: subreddit listings as a lazy post stream

use super::{RedditClient, RedditError};
use carelead_domain::{Post, PostSource, PostSourceError, PostStream, RetryPolicy, retry};
use futures::stream;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use time::OffsetDateTime;

/// Reddit caps listing pages at 100 items
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct RedditSourceConfig {
    /// Search terms; empty means read each subreddit's newest posts
    pub keywords: Vec<String>,
    pub page_size: u32,
    pub max_pages_per_channel: u32,
    pub retry: RetryPolicy,
}

impl Default for RedditSourceConfig {
    fn default() -> Self {
        Self {
            keywords: vec![],
            page_size: MAX_PAGE_SIZE,
            max_pages_per_channel: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Post source backed by subreddit search or `/new` listings
pub struct RedditPostSource {
    client: Arc<RedditClient>,
    config: RedditSourceConfig,
}

impl RedditPostSource {
    pub fn new(client: Arc<RedditClient>, config: RedditSourceConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_page(
        &self,
        channel: &str,
        after: Option<&str>,
    ) -> Result<ListingData, RedditError> {
        let page_size = self.config.page_size.clamp(1, MAX_PAGE_SIZE);
        let mut query = vec![
            ("limit", page_size.to_string()),
            ("raw_json", "1".to_string()),
        ];

        let path = if self.config.keywords.is_empty() {
            format!("/r/{}/new", channel)
        } else {
            query.push(("q", self.config.keywords.join(" OR ")));
            query.push(("restrict_sr", "1".to_string()));
            query.push(("sort", "new".to_string()));
            format!("/r/{}/search", channel)
        };

        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self.client.send(self.client.get(&path).query(&query)).await?;
        let listing: Listing = response
            .json()
            .await
            .map_err(|e| RedditError::Api(format!("Invalid listing for r/{}: {}", channel, e)))?;

        Ok(listing.data)
    }

    /// Search results are fuzzy; keep only posts that mention a keyword
    fn matches_keywords(&self, post: &RawPost) -> bool {
        if self.config.keywords.is_empty() {
            return true;
        }
        let haystack = format!("{} {}", post.title, post.selftext).to_lowercase();
        self.config
            .keywords
            .iter()
            .any(|k| haystack.contains(&k.to_lowercase()))
    }
}

impl PostSource for RedditPostSource {
    fn fetch_candidates<'a>(&'a self, channels: &'a [String], limit: usize) -> PostStream<'a> {
        let per_channel = if channels.is_empty() {
            0
        } else {
            limit.div_ceil(channels.len())
        };

        let cursor = Cursor {
            source: self,
            channels: channels.iter(),
            current: None,
            buffer: VecDeque::new(),
            remaining: limit,
            per_channel,
            done: false,
        };

        Box::pin(stream::unfold(cursor, |mut cursor| async move {
            let item = cursor.next().await?;
            Some((item, cursor))
        }))
    }
}

struct ChannelCursor {
    name: String,
    after: Option<String>,
    pages: u32,
    yielded: usize,
    exhausted: bool,
}

impl ChannelCursor {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            after: None,
            pages: 0,
            yielded: 0,
            exhausted: false,
        }
    }
}

/// Walks channels in order, fetching one page at a time
struct Cursor<'a> {
    source: &'a RedditPostSource,
    channels: std::slice::Iter<'a, String>,
    current: Option<ChannelCursor>,
    buffer: VecDeque<Post>,
    remaining: usize,
    per_channel: usize,
    done: bool,
}

impl Cursor<'_> {
    async fn next(&mut self) -> Option<Result<Post, PostSourceError>> {
        loop {
            if self.done || self.remaining == 0 {
                return None;
            }

            if let Some(post) = self.buffer.pop_front() {
                self.remaining -= 1;
                if let Some(channel) = self.current.as_mut() {
                    channel.yielded += 1;
                }
                return Some(Ok(post));
            }

            let needs_next_channel = match &self.current {
                Some(channel) => channel.exhausted || channel.yielded >= self.per_channel,
                None => true,
            };
            if needs_next_channel {
                match self.channels.next() {
                    Some(name) => {
                        self.current = Some(ChannelCursor::new(name));
                        continue;
                    }
                    None => return None,
                }
            }

            let Some(channel) = self.current.as_mut() else {
                return None;
            };
            let name = channel.name.clone();
            let after = channel.after.clone();
            let source = self.source;

            let result = retry(&source.config.retry, "reddit_listing", || {
                source.fetch_page(&name, after.as_deref())
            })
            .await;

            match result {
                Ok(page) => {
                    channel.pages += 1;
                    let fetched = page.children.len();
                    let share = self.per_channel.saturating_sub(channel.yielded);
                    let posts: Vec<Post> = page
                        .children
                        .into_iter()
                        .filter(|thing| thing.kind == "t3")
                        .map(|thing| thing.data)
                        .filter(|raw| source.matches_keywords(raw))
                        .map(|raw| raw.into_post(&name))
                        .take(share)
                        .collect();

                    tracing::debug!(
                        channel = %name,
                        page = channel.pages,
                        fetched,
                        kept = posts.len(),
                        "Fetched Reddit listing page"
                    );

                    channel.after = page.after;
                    channel.exhausted = fetched == 0
                        || channel.after.is_none()
                        || channel.pages >= source.config.max_pages_per_channel;
                    self.buffer.extend(posts);
                }
                Err(RedditError::Inaccessible(message)) => {
                    tracing::warn!(channel = %name, error = %message, "Skipping subreddit");
                    channel.exhausted = true;
                }
                Err(RedditError::Auth(message)) => {
                    self.done = true;
                    return Some(Err(PostSourceError::Auth(message)));
                }
                Err(RedditError::Api(message)) => {
                    self.done = true;
                    return Some(Err(PostSourceError::Api(format!("r/{}: {}", name, message))));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(PostSourceError::Unavailable {
                        attempts: source.config.retry.max_attempts(),
                        message: format!("r/{}: {}", name, e),
                    }));
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
    after: Option<String>,
}

#[derive(Deserialize)]
struct Thing {
    kind: String,
    data: RawPost,
}

#[derive(Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    permalink: String,
    created_utc: Option<f64>,
}

impl RawPost {
    fn into_post(self, channel: &str) -> Post {
        let created_at = self
            .created_utc
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs as i64).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let text = if self.selftext.trim().is_empty() {
            self.title.clone()
        } else {
            self.selftext
        };

        Post {
            url: format!("https://www.reddit.com{}", self.permalink),
            channel: if self.subreddit.is_empty() {
                channel.to_string()
            } else {
                self.subreddit
            },
            id: self.id,
            title: self.title,
            text,
            author: self.author,
            created_at,
        }
    }
}
