//! In-memory fakes for use case tests

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream;
use time::OffsetDateTime;

use crate::model::{Lead, LeadFilter, LeadStatus, OutreachLogEntry, Post, ScoreResult};
use crate::ports::{
    Clock, LeadRepository, OutreachLog, OutreachSendError, PostSource, PostSourceError,
    PostStream, ReplyReceipt, ReplySender, RepositoryError, Scorer, ScoringError,
    UpsertOutcome, ensure_transition,
};

pub fn post(id: &str, text: &str) -> Post {
    Post {
        id: id.to_string(),
        channel: "CaregiverSupport".to_string(),
        title: format!("Title {}", id),
        text: text.to_string(),
        author: format!("author_{}", id),
        url: format!("https://www.reddit.com/r/CaregiverSupport/comments/{}/", id),
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

pub fn lead(id: &str, score: u8) -> Lead {
    let post = post(id, "Looking for help");
    let result = ScoreResult {
        post_id: id.to_string(),
        score,
        rationale: "test".to_string(),
    };
    Lead::from_scored(&post, &result, OffsetDateTime::UNIX_EPOCH)
}

#[derive(Default)]
pub struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }
}

/// Yields a fixed list of posts, then optionally fails
pub struct FakeSource {
    posts: Vec<Post>,
    fail_after: Option<usize>,
}

impl FakeSource {
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            posts,
            fail_after: None,
        }
    }

    /// Yield `count` posts, then an `Unavailable` error
    pub fn failing_after(posts: Vec<Post>, count: usize) -> Self {
        Self {
            posts,
            fail_after: Some(count),
        }
    }
}

impl PostSource for FakeSource {
    fn fetch_candidates<'a>(&'a self, _channels: &'a [String], limit: usize) -> PostStream<'a> {
        let take = self.fail_after.unwrap_or(usize::MAX).min(limit);
        let mut items: Vec<Result<Post, PostSourceError>> =
            self.posts.iter().take(take).cloned().map(Ok).collect();
        if self.fail_after.is_some() {
            items.push(Err(PostSourceError::Unavailable {
                attempts: 3,
                message: "connection refused".to_string(),
            }));
        }
        Box::pin(stream::iter(items))
    }
}

/// Returns preset scores keyed by post ID; unknown posts fail to parse
pub struct FakeScorer {
    scores: HashMap<String, u8>,
    calls: Mutex<Vec<String>>,
}

impl FakeScorer {
    pub fn new(scores: &[(&str, u8)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(id, score)| (id.to_string(), *score))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scorer for FakeScorer {
    async fn score(&self, post: &Post) -> Result<ScoreResult, ScoringError> {
        self.calls.lock().unwrap().push(post.id.clone());
        match self.scores.get(&post.id) {
            Some(score) => Ok(ScoreResult {
                post_id: post.id.clone(),
                score: *score,
                rationale: format!("scored {}", score),
            }),
            None => Err(ScoringError::Parse("I cannot score this post".to_string())),
        }
    }
}

/// Lead table with injectable write failures
#[derive(Default)]
pub struct MemoryLeads {
    rows: Mutex<BTreeMap<String, Lead>>,
    failing_upserts: AtomicU32,
    upsert_attempts: AtomicU32,
}

impl MemoryLeads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` upserts fail with a write error
    pub fn fail_upserts(&self, count: u32) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }

    pub fn upsert_attempts(&self) -> u32 {
        self.upsert_attempts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn status_of(&self, post_id: &str) -> Option<LeadStatus> {
        self.rows.lock().unwrap().get(post_id).map(|l| l.status)
    }

    pub fn all(&self) -> Vec<Lead> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl LeadRepository for MemoryLeads {
    async fn get(&self, post_id: &str) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.rows.lock().unwrap().get(post_id).cloned())
    }

    async fn upsert(&self, lead: &Lead) -> Result<UpsertOutcome, RepositoryError> {
        self.upsert_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_upserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_upserts.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Write("store offline".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&lead.post_id) {
            return Ok(UpsertOutcome::AlreadyExists);
        }
        rows.insert(lead.post_id.clone(), lead.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn set_status(&self, post_id: &str, status: LeadStatus) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(post_id)
            .ok_or_else(|| RepositoryError::NotFound(post_id.to_string()))?;
        ensure_transition(post_id, row.status, status)?;
        row.status = status;
        Ok(())
    }

    async fn list(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect())
    }
}

/// Outreach log with injectable append failures
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<OutreachLogEntry>>,
    failing_appends: AtomicU32,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` appends fail with a write error
    pub fn fail_appends(&self, count: u32) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<OutreachLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutreachLog for MemoryLog {
    async fn append(&self, entry: &OutreachLogEntry) -> Result<(), RepositoryError> {
        let remaining = self.failing_appends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_appends.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Write("log offline".to_string()));
        }
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn contains(&self, post_id: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.post_id == post_id))
    }

    async fn list(&self) -> Result<Vec<OutreachLogEntry>, RepositoryError> {
        Ok(self.entries())
    }
}

/// Records replies; can fail permanently or for a queue of attempts
#[derive(Default)]
pub struct FakeReplier {
    sent: Mutex<Vec<(String, String)>>,
    queued_failures: Mutex<VecDeque<OutreachSendError>>,
    permanent_failure: Option<String>,
    attempts: AtomicU32,
}

impl FakeReplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: OutreachSendError) -> Self {
        Self {
            permanent_failure: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_next(&self, error: OutreachSendError) {
        self.queued_failures.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplySender for FakeReplier {
    async fn reply(&self, post_id: &str, message: &str) -> Result<ReplyReceipt, OutreachSendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.permanent_failure {
            return Err(OutreachSendError::Api(error.clone()));
        }
        if let Some(error) = self.queued_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent
            .lock()
            .unwrap()
            .push((post_id.to_string(), message.to_string()));
        Ok(ReplyReceipt {
            id: format!("t1_{}", post_id),
        })
    }
}
