//! Pipeline use case - fetch, dedup, score, store, and engage, one post at a time

use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use crate::model::{Lead, LeadStatus, Post, PostOutcome, RunSummary};
use crate::ports::{
    Clock, LeadRepository, OutreachLog, PostSource, PostSourceError, ReplySender,
    RepositoryError, Scorer, UpsertOutcome,
};
use crate::retry::{RetryPolicy, retry};
use crate::usecases::dedup::DedupView;
use crate::usecases::outreach::{Engagement, OutreachEngine, OutreachError};

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Channels (subreddits) to fetch from
    pub channels: Vec<String>,
    /// Max posts fetched per run
    pub limit: usize,
    /// Minimum score for outreach
    pub threshold: u8,
    /// Retries for lead lookups and writes
    pub store_retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channels: vec![],
            limit: 50,
            threshold: 70,
            store_retry: RetryPolicy::default(),
        }
    }
}

/// Errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Post source unavailable: {0}")]
    SourceUnavailable(#[from] PostSourceError),
    #[error("Lead store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Pipeline orchestrator
pub struct Pipeline<S, Sc, L, O, R, C>
where
    S: PostSource + ?Sized,
    Sc: Scorer + ?Sized,
    L: LeadRepository + ?Sized,
    O: OutreachLog + ?Sized,
    R: ReplySender + ?Sized,
    C: Clock + ?Sized,
{
    source: Arc<S>,
    scorer: Arc<Sc>,
    leads: Arc<L>,
    dedup: DedupView<L>,
    outreach: OutreachEngine<R, L, O, C>,
    clock: Arc<C>,
    config: PipelineConfig,
}

impl<S, Sc, L, O, R, C> Pipeline<S, Sc, L, O, R, C>
where
    S: PostSource + ?Sized,
    Sc: Scorer + ?Sized,
    L: LeadRepository + ?Sized,
    O: OutreachLog + ?Sized,
    R: ReplySender + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(
        source: Arc<S>,
        scorer: Arc<Sc>,
        leads: Arc<L>,
        outreach: OutreachEngine<R, L, O, C>,
        clock: Arc<C>,
        config: PipelineConfig,
    ) -> Self {
        let dedup = DedupView::new(Arc::clone(&leads));
        Self {
            source,
            scorer,
            leads,
            dedup,
            outreach,
            clock,
            config,
        }
    }

    /// Run once over the configured channels.
    ///
    /// Posts are carried through to a terminal state one at a time. Per-post
    /// failures are recorded in the summary; only a source failure aborts.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::new(Uuid::new_v4());

        tracing::info!(
            run_id = %summary.run_id,
            channels = ?self.config.channels,
            limit = self.config.limit,
            threshold = self.config.threshold,
            "Starting pipeline run"
        );

        let mut posts = self
            .source
            .fetch_candidates(&self.config.channels, self.config.limit);

        while let Some(item) = posts.next().await {
            let post = item.inspect_err(|e| {
                tracing::error!(run_id = %summary.run_id, error = %e, "Post source failed, aborting run");
            })?;
            summary.fetched += 1;

            let (outcome, newly_stored) = self.process_post(&post).await;
            tracing::debug!(post_id = %post.id, outcome = outcome.label(), "Post finished");
            summary.record(&post.id, outcome, newly_stored);
        }

        log_summary(&summary);
        Ok(summary)
    }

    /// Returns the post's terminal outcome and whether a new lead row was written
    async fn process_post(&self, post: &Post) -> (PostOutcome, bool) {
        let policy = &self.config.store_retry;

        let existing = match retry(policy, "dedup lookup", || self.dedup.lookup(&post.id)).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::error!(post_id = %post.id, error = %e, "Dedup lookup failed");
                return (
                    PostOutcome::StoreFailed {
                        error: e.to_string(),
                    },
                    false,
                );
            }
        };

        if let Some(mut lead) = existing {
            if lead.status == LeadStatus::New {
                tracing::info!(post_id = %post.id, score = lead.score, "Resuming outreach for stored lead");
                return (self.engage(&mut lead, self.config.threshold).await, false);
            }
            tracing::debug!(post_id = %post.id, status = %lead.status, "Already processed");
            return (PostOutcome::SkippedDuplicate, false);
        }

        let score = match self.scorer.score(post).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(post_id = %post.id, error = %e, "Scoring failed, skipping post");
                return (
                    PostOutcome::ScoringFailed {
                        error: e.to_string(),
                    },
                    false,
                );
            }
        };

        tracing::info!(
            post_id = %post.id,
            channel = %post.channel,
            score = score.score,
            "Scored post"
        );

        let mut lead = Lead::from_scored(post, &score, self.clock.now());

        match retry(policy, "lead upsert", || self.dedup.mark_seen(&lead)).await {
            Ok(UpsertOutcome::Inserted) => {}
            Ok(UpsertOutcome::AlreadyExists) => {
                tracing::warn!(post_id = %post.id, "Lead appeared between lookup and upsert");
                return (PostOutcome::SkippedDuplicate, false);
            }
            Err(e) => {
                tracing::error!(
                    post_id = %post.id,
                    attempts = policy.max_attempts(),
                    error = %e,
                    "Failed to store lead"
                );
                return (
                    PostOutcome::StoreFailed {
                        error: e.to_string(),
                    },
                    false,
                );
            }
        }

        (self.engage(&mut lead, self.config.threshold).await, true)
    }

    async fn engage(&self, lead: &mut Lead, threshold: u8) -> PostOutcome {
        match self.outreach.maybe_engage(lead, threshold).await {
            Ok(Engagement::Contacted(_)) => PostOutcome::Contacted,
            Ok(Engagement::Skipped) => PostOutcome::Skipped,
            Ok(Engagement::Deferred { .. }) => PostOutcome::Pending,
            Ok(Engagement::AlreadyHandled { .. }) => PostOutcome::SkippedDuplicate,
            Err(OutreachError::Send(e)) => PostOutcome::OutreachFailed {
                error: e.to_string(),
            },
            Err(e @ OutreachError::Unlogged { .. }) => PostOutcome::TransitionFailed {
                error: e.to_string(),
            },
            Err(OutreachError::Store(e)) => {
                tracing::error!(post_id = %lead.post_id, error = %e, "Failed to record outreach state");
                PostOutcome::TransitionFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        run_id = %summary.run_id,
        fetched = summary.fetched,
        processed = summary.processed,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        contacted = summary.contacted,
        pending = summary.pending,
        errored = summary.errored,
        "Run complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutreachLogEntry;
    use crate::ports::OutreachSendError;
    use crate::usecases::outreach::OutreachConfig;
    use crate::usecases::testing::{
        FakeReplier, FakeScorer, FakeSource, FixedClock, MemoryLeads, MemoryLog, post,
    };
    use crate::usecases::throttle::ThrottleConfig;

    type TestPipeline =
        Pipeline<FakeSource, FakeScorer, MemoryLeads, MemoryLog, FakeReplier, FixedClock>;

    struct Harness {
        scorer: Arc<FakeScorer>,
        leads: Arc<MemoryLeads>,
        log: Arc<MemoryLog>,
        replier: Arc<FakeReplier>,
    }

    impl Harness {
        fn new(scores: &[(&str, u8)]) -> Self {
            Self {
                scorer: Arc::new(FakeScorer::new(scores)),
                leads: Arc::new(MemoryLeads::new()),
                log: Arc::new(MemoryLog::new()),
                replier: Arc::new(FakeReplier::new()),
            }
        }

        fn pipeline(&self, source: FakeSource) -> TestPipeline {
            self.pipeline_with(source, PipelineConfig::default())
        }

        fn pipeline_with(&self, source: FakeSource, config: PipelineConfig) -> TestPipeline {
            let clock = Arc::new(FixedClock);
            let outreach = OutreachEngine::new(
                Arc::clone(&self.replier),
                Arc::clone(&self.leads),
                Arc::clone(&self.log),
                Arc::clone(&clock),
                OutreachConfig {
                    enabled: true,
                    dry_run: false,
                    template: None,
                    throttle: ThrottleConfig::default(),
                    send_retry: RetryPolicy::immediate(1),
                    store_retry: RetryPolicy::immediate(1),
                },
            );
            Pipeline::new(
                Arc::new(source),
                Arc::clone(&self.scorer),
                Arc::clone(&self.leads),
                outreach,
                clock,
                PipelineConfig {
                    channels: vec!["CaregiverSupport".to_string()],
                    threshold: 70,
                    store_retry: RetryPolicy::immediate(2),
                    ..config
                },
            )
        }

        /// Every CONTACTED lead has exactly one log entry; no other lead has any
        fn assert_log_matches_status(&self) {
            let entries: Vec<OutreachLogEntry> = self.log.entries();
            for lead in self.leads.all() {
                let count = entries.iter().filter(|e| e.post_id == lead.post_id).count();
                let expected = usize::from(lead.status == LeadStatus::Contacted);
                assert_eq!(count, expected, "log entries for {}", lead.post_id);
            }
        }
    }

    fn p1() -> Post {
        post("p1", "Need caregiver in New Haven for my father")
    }

    fn p2() -> Post {
        post("p2", "Anyone watching the game tonight?")
    }

    #[tokio::test]
    async fn test_high_score_is_contacted() {
        let harness = Harness::new(&[("p1", 85)]);
        let summary = harness
            .pipeline(FakeSource::new(vec![p1()]))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.contacted, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(harness.leads.status_of("p1"), Some(LeadStatus::Contacted));
        assert_eq!(harness.log.entries().len(), 1);
        assert_eq!(harness.replier.sent()[0].0, "p1");
        harness.assert_log_matches_status();
    }

    #[tokio::test]
    async fn test_low_score_is_skipped() {
        let harness = Harness::new(&[("p2", 10)]);
        let summary = harness
            .pipeline(FakeSource::new(vec![p2()]))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(harness.leads.status_of("p2"), Some(LeadStatus::Skipped));
        assert!(harness.log.entries().is_empty());
        assert!(harness.replier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_does_not_rescore_or_duplicate() {
        let harness = Harness::new(&[("p1", 85), ("p2", 10)]);
        harness
            .pipeline(FakeSource::new(vec![p1(), p2()]))
            .run()
            .await
            .unwrap();

        let second = harness
            .pipeline(FakeSource::new(vec![p1(), p2()]))
            .run()
            .await
            .unwrap();

        assert_eq!(second.duplicates, 2);
        assert_eq!(second.processed, 0);
        assert_eq!(harness.scorer.calls(), vec!["p1", "p2"]);
        assert_eq!(harness.leads.len(), 2);
        assert_eq!(harness.log.entries().len(), 1);
        assert_eq!(harness.replier.sent().len(), 1);
        harness.assert_log_matches_status();
    }

    #[tokio::test]
    async fn test_parse_error_skips_post_and_continues() {
        // p3 has no preset score, so the fake scorer fails to parse it
        let harness = Harness::new(&[("p4", 75)]);
        let summary = harness
            .pipeline(FakeSource::new(vec![
                post("p3", "asdf"),
                post("p4", "Looking for home health aide near Hamden"),
            ]))
            .run()
            .await
            .unwrap();

        assert!(summary.is_partial());
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.contacted, 1);
        assert!(matches!(
            summary.outcomes[0],
            (ref id, PostOutcome::ScoringFailed { .. }) if id == "p3"
        ));
        assert_eq!(harness.leads.status_of("p3"), None);
        assert_eq!(harness.leads.status_of("p4"), Some(LeadStatus::Contacted));
    }

    #[tokio::test]
    async fn test_store_failure_is_retried_then_isolated() {
        let harness = Harness::new(&[("p1", 85), ("p2", 10)]);
        // Three failures exhaust the first post's attempts; the second post succeeds
        harness.leads.fail_upserts(3);

        let summary = harness
            .pipeline(FakeSource::new(vec![p1(), p2()]))
            .run()
            .await
            .unwrap();

        assert_eq!(harness.leads.upsert_attempts(), 4);
        assert!(matches!(
            summary.outcomes[0].1,
            PostOutcome::StoreFailed { .. }
        ));
        assert_eq!(summary.outcomes[1].1, PostOutcome::Skipped);
        assert_eq!(harness.leads.status_of("p1"), None);
        assert!(harness.replier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transient_store_failure_recovers() {
        let harness = Harness::new(&[("p1", 85)]);
        harness.leads.fail_upserts(1);

        let summary = harness
            .pipeline(FakeSource::new(vec![p1()]))
            .run()
            .await
            .unwrap();

        assert!(!summary.is_partial());
        assert_eq!(summary.contacted, 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_resumed_next_run() {
        let harness = Harness::new(&[("p1", 85)]);
        harness
            .replier
            .fail_next(OutreachSendError::Network("connection reset".to_string()));

        let first = harness
            .pipeline(FakeSource::new(vec![p1()]))
            .run()
            .await
            .unwrap();
        assert!(matches!(
            first.outcomes[0].1,
            PostOutcome::OutreachFailed { .. }
        ));
        assert_eq!(harness.leads.status_of("p1"), Some(LeadStatus::New));
        assert!(harness.log.entries().is_empty());

        let second = harness
            .pipeline(FakeSource::new(vec![p1()]))
            .run()
            .await
            .unwrap();
        assert_eq!(second.contacted, 1);
        assert_eq!(harness.scorer.calls(), vec!["p1"]);
        assert_eq!(harness.leads.status_of("p1"), Some(LeadStatus::Contacted));
        harness.assert_log_matches_status();
    }

    #[tokio::test]
    async fn test_unlogged_reply_is_not_sent_again() {
        let harness = Harness::new(&[("p1", 85)]);
        harness.log.fail_appends(2);
        let pipeline = harness.pipeline(FakeSource::new(vec![p1()]));

        let first = pipeline.run().await.unwrap();
        assert!(matches!(
            &first.outcomes[0].1,
            PostOutcome::TransitionFailed { error } if error.contains("t1_p1")
        ));
        assert_eq!(harness.leads.status_of("p1"), Some(LeadStatus::New));

        let second = pipeline.run().await.unwrap();
        assert_eq!(second.contacted, 1);
        assert_eq!(harness.replier.sent().len(), 1);
        assert_eq!(harness.leads.status_of("p1"), Some(LeadStatus::Contacted));
        harness.assert_log_matches_status();
    }

    #[tokio::test]
    async fn test_source_failure_aborts_run() {
        let harness = Harness::new(&[("p1", 85), ("p2", 10)]);
        let result = harness
            .pipeline(FakeSource::failing_after(vec![p1(), p2()], 1))
            .run()
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::SourceUnavailable(PostSourceError::Unavailable { .. }))
        ));
        // The post handled before the failure stays committed
        assert_eq!(harness.leads.status_of("p1"), Some(LeadStatus::Contacted));
        assert_eq!(harness.leads.status_of("p2"), None);
    }

    #[tokio::test]
    async fn test_limit_bounds_posts() {
        let harness = Harness::new(&[("p1", 85), ("p2", 10)]);
        let summary = harness
            .pipeline_with(
                FakeSource::new(vec![p1(), p2()]),
                PipelineConfig {
                    limit: 1,
                    ..Default::default()
                },
            )
            .run()
            .await
            .unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(harness.leads.len(), 1);
    }
}
