//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A candidate post fetched from a source platform (e.g., Reddit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Platform-specific post ID (the dedup key)
    pub id: String,
    /// Channel the post was found in (subreddit name)
    pub channel: String,
    /// Post title
    pub title: String,
    /// Post body, or the title when the body is empty
    pub text: String,
    /// Author username
    pub author: String,
    /// Permalink to the original post
    pub url: String,
    /// When the post was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Score produced for a single post. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub post_id: String,
    /// Confidence score, always within [0, 100]
    pub score: u8,
    pub rationale: String,
}

impl ScoreResult {
    pub const MAX_SCORE: u8 = 100;
}

/// Outreach status of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Skipped,
}

impl LeadStatus {
    /// Only NEW leads move, and only to a terminal status
    pub fn can_transition_to(self, next: LeadStatus) -> bool {
        matches!(
            (self, next),
            (LeadStatus::New, LeadStatus::Contacted) | (LeadStatus::New, LeadStatus::Skipped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(LeadStatus::New),
            "CONTACTED" => Ok(LeadStatus::Contacted),
            "SKIPPED" => Ok(LeadStatus::Skipped),
            other => Err(format!("Unknown lead status: {}", other)),
        }
    }
}

/// A scored, stored candidate derived from one source post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Unique key, the source post ID
    pub post_id: String,
    pub channel: String,
    pub title: String,
    pub text: String,
    pub author: String,
    pub url: String,
    pub score: u8,
    pub rationale: String,
    pub status: LeadStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub posted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub scored_at: OffsetDateTime,
}

impl Lead {
    /// Build a NEW lead from a post and its score
    pub fn from_scored(post: &Post, score: &ScoreResult, scored_at: OffsetDateTime) -> Self {
        Self {
            post_id: post.id.clone(),
            channel: post.channel.clone(),
            title: post.title.clone(),
            text: post.text.clone(),
            author: post.author.clone(),
            url: post.url.clone(),
            score: score.score,
            rationale: score.rationale.clone(),
            status: LeadStatus::New,
            posted_at: post.created_at,
            scored_at,
        }
    }
}

/// Append-only record of a reply that was sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachLogEntry {
    pub post_id: String,
    pub post_url: String,
    pub score: u8,
    pub message_sent: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

/// Filter for listing leads
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub min_score: Option<u8>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(status) = self.status {
            if lead.status != status {
                return false;
            }
        }
        if let Some(min_score) = self.min_score {
            if lead.score < min_score {
                return false;
            }
        }
        true
    }
}

/// Terminal state of a single post within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// A lead already existed for this post and needed no further work
    SkippedDuplicate,
    /// Reply sent and logged
    Contacted,
    /// Stored with a score below the threshold
    Skipped,
    /// Stored as NEW; outreach was deferred (dry run or outreach disabled)
    Pending,
    ScoringFailed { error: String },
    StoreFailed { error: String },
    OutreachFailed { error: String },
    TransitionFailed { error: String },
}

impl PostOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            PostOutcome::ScoringFailed { .. }
                | PostOutcome::StoreFailed { .. }
                | PostOutcome::OutreachFailed { .. }
                | PostOutcome::TransitionFailed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostOutcome::SkippedDuplicate => "skipped_duplicate",
            PostOutcome::Contacted => "contacted",
            PostOutcome::Skipped => "skipped",
            PostOutcome::Pending => "pending",
            PostOutcome::ScoringFailed { .. } => "scoring_error",
            PostOutcome::StoreFailed { .. } => "store_error",
            PostOutcome::OutreachFailed { .. } => "outreach_error",
            PostOutcome::TransitionFailed { .. } => "transition_error",
        }
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub fetched: usize,
    /// Posts that were scored and stored this run
    pub processed: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub contacted: usize,
    pub pending: usize,
    pub errored: usize,
    #[serde(skip)]
    pub outcomes: Vec<(String, PostOutcome)>,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            fetched: 0,
            processed: 0,
            duplicates: 0,
            skipped: 0,
            contacted: 0,
            pending: 0,
            errored: 0,
            outcomes: Vec::new(),
        }
    }

    /// Record a post's terminal outcome
    pub fn record(&mut self, post_id: &str, outcome: PostOutcome, newly_stored: bool) {
        if newly_stored {
            self.processed += 1;
        }
        match &outcome {
            PostOutcome::SkippedDuplicate => self.duplicates += 1,
            PostOutcome::Contacted => self.contacted += 1,
            PostOutcome::Skipped => self.skipped += 1,
            PostOutcome::Pending => self.pending += 1,
            _ => self.errored += 1,
        }
        self.outcomes.push((post_id.to_string(), outcome));
    }

    /// True when at least one post ended in an error state
    pub fn is_partial(&self) -> bool {
        self.errored > 0
    }
}
