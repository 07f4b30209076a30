//! Port definitions (traits) for external dependencies
//!
//! Each external service gets one narrow capability trait so the pipeline can
//! run against mock implementations without network access.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{Lead, LeadFilter, LeadStatus, OutreachLogEntry, Post, ScoreResult};

/// Error type for post source operations
#[derive(Debug, Error)]
pub enum PostSourceError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Source unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },
}

impl PostSourceError {
    /// Errors worth another attempt after a back-off delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PostSourceError::RateLimited(_)
                | PostSourceError::Network(_)
                | PostSourceError::Server(_)
        )
    }
}

/// Lazy sequence of candidate posts
pub type PostStream<'a> = BoxStream<'a, Result<Post, PostSourceError>>;

/// Port for fetching candidate posts from a content source
pub trait PostSource: Send + Sync {
    /// Stream up to `limit` posts across the given channels.
    ///
    /// The stream yields `PostSourceError::Unavailable` once the source cannot
    /// be reached after its configured retries; callers treat that as fatal.
    fn fetch_candidates<'a>(&'a self, channels: &'a [String], limit: usize) -> PostStream<'a>;
}

/// Error type for sending replies
#[derive(Debug, Error)]
pub enum OutreachSendError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Result of a successful reply
#[derive(Debug, Clone)]
pub struct ReplyReceipt {
    /// Platform-specific ID of the created reply
    pub id: String,
}

/// Port for the source's reply capability, keyed by post ID
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn reply(&self, post_id: &str, message: &str) -> Result<ReplyReceipt, OutreachSendError>;
}

/// Error type for inference service calls
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("LLM server error: {0}")]
    Server(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Timeout")]
    Timeout,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl InferenceError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InferenceError::Server(_)
                | InferenceError::Network(_)
                | InferenceError::RateLimited
                | InferenceError::Timeout
        )
    }
}

/// A text-in, text-out inference request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
}

/// Port for the language-model inference service
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

/// Error type for scoring a post
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring parse error: {0}")]
    Parse(String),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Port for turning a post into a score
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, post: &Post) -> Result<ScoreResult, ScoringError>;
}

/// Error type for tabular store operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Repository write error: {0}")]
    Write(String),
    #[error("Repository read error: {0}")]
    Read(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid status transition for {post_id}: {from} -> {to}")]
    InvalidTransition {
        post_id: String,
        from: LeadStatus,
        to: LeadStatus,
    },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// Store failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Write(_) | RepositoryError::Read(_))
    }
}

/// Outcome of an upsert keyed by post ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A row with that key already existed; nothing was written
    AlreadyExists,
}

/// Port for the Leads table
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Look up a lead by post ID
    async fn get(&self, post_id: &str) -> Result<Option<Lead>, RepositoryError>;

    /// Insert a lead unless one with the same post ID exists
    async fn upsert(&self, lead: &Lead) -> Result<UpsertOutcome, RepositoryError>;

    /// Move a lead to a new status. Only NEW leads may move.
    async fn set_status(&self, post_id: &str, status: LeadStatus) -> Result<(), RepositoryError>;

    /// List leads matching a filter
    async fn list(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError>;
}

/// Port for the append-only Outreach Log table
#[async_trait]
pub trait OutreachLog: Send + Sync {
    async fn append(&self, entry: &OutreachLogEntry) -> Result<(), RepositoryError>;

    /// Whether an entry exists for the given post
    async fn contains(&self, post_id: &str) -> Result<bool, RepositoryError>;

    async fn list(&self) -> Result<Vec<OutreachLogEntry>, RepositoryError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Reject a transition the lead lifecycle does not allow
pub fn ensure_transition(
    post_id: &str,
    from: LeadStatus,
    to: LeadStatus,
) -> Result<(), RepositoryError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition {
            post_id: post_id.to_string(),
            from,
            to,
        })
    }
}
