//! Outreach use case - replies to qualifying leads and records each reply

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::model::{Lead, LeadStatus, OutreachLogEntry};
use crate::ports::{
    Clock, LeadRepository, OutreachLog, OutreachSendError, ReplySender, RepositoryError,
};
use crate::retry::{RetryPolicy, retry};
use crate::usecases::template::OutreachTemplate;
use crate::usecases::throttle::{OutreachThrottle, ThrottleConfig};

/// Configuration for the outreach engine
#[derive(Debug, Clone)]
pub struct OutreachConfig {
    /// When false, qualifying leads stay NEW and nothing is sent
    pub enabled: bool,
    /// Compose and log replies without sending them
    pub dry_run: bool,
    /// Reply template; None uses the default message
    pub template: Option<String>,
    pub throttle: ThrottleConfig,
    /// Retries for replies rejected with a rate limit
    pub send_retry: RetryPolicy,
    /// Retries for status and log writes
    pub store_retry: RetryPolicy,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: true,
            template: None,
            throttle: ThrottleConfig {
                per_minute: None,
                per_hour: Some(20),
                min_interval: Duration::from_secs(30),
            },
            send_retry: RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(900),
            },
            store_retry: RetryPolicy::default(),
        }
    }
}

/// What `maybe_engage` did with a lead
#[derive(Debug, Clone, PartialEq)]
pub enum Engagement {
    /// Reply sent, logged, and the lead moved to CONTACTED
    Contacted(OutreachLogEntry),
    /// Below the threshold; the lead moved to SKIPPED
    Skipped,
    /// Outreach is disabled or in dry-run; the lead stays NEW
    Deferred { message: Option<String> },
    /// The lead was already past NEW, or already had a log entry
    AlreadyHandled { status: LeadStatus },
}

impl Engagement {
    pub fn into_entry(self) -> Option<OutreachLogEntry> {
        match self {
            Engagement::Contacted(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Errors from the outreach engine
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error("Reply failed: {0}")]
    Send(#[from] OutreachSendError),
    #[error("Outreach bookkeeping failed: {0}")]
    Store(#[from] RepositoryError),
    /// The reply went out but could not be logged; the engine keeps it and
    /// records it instead of resending on the next attempt for this lead
    #[error("Reply {reply_id} to {post_id} was sent but not logged: {source}")]
    Unlogged {
        post_id: String,
        reply_id: String,
        source: RepositoryError,
    },
}

/// A sent reply whose log entry is still missing
struct UnloggedReply {
    reply_id: String,
    entry: OutreachLogEntry,
}

/// Sends replies to leads at or above a threshold, at most once per lead
pub struct OutreachEngine<R, L, O, C>
where
    R: ReplySender + ?Sized,
    L: LeadRepository + ?Sized,
    O: OutreachLog + ?Sized,
    C: Clock + ?Sized,
{
    replier: Arc<R>,
    leads: Arc<L>,
    log: Arc<O>,
    clock: Arc<C>,
    config: OutreachConfig,
    template: OutreachTemplate,
    throttle: OutreachThrottle,
    unlogged: Mutex<HashMap<String, UnloggedReply>>,
}

impl<R, L, O, C> OutreachEngine<R, L, O, C>
where
    R: ReplySender + ?Sized,
    L: LeadRepository + ?Sized,
    O: OutreachLog + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(
        replier: Arc<R>,
        leads: Arc<L>,
        log: Arc<O>,
        clock: Arc<C>,
        config: OutreachConfig,
    ) -> Self {
        let template = OutreachTemplate::new(config.template.clone());
        let throttle = OutreachThrottle::new(config.throttle);
        Self {
            replier,
            leads,
            log,
            clock,
            config,
            template,
            throttle,
            unlogged: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OutreachConfig {
        &self.config
    }

    fn is_deferred(&self) -> bool {
        self.config.dry_run || !self.config.enabled
    }

    /// Engage a lead if it qualifies.
    ///
    /// The stored status and the outreach log are consulted before anything is
    /// sent, so a lead is never replied to twice. On success `lead.status`
    /// mirrors the stored status.
    pub async fn maybe_engage(
        &self,
        lead: &mut Lead,
        threshold: u8,
    ) -> Result<Engagement, OutreachError> {
        let policy = &self.config.store_retry;
        let post_id = lead.post_id.clone();

        let current = retry(policy, "lead lookup", || self.leads.get(&post_id))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(post_id.clone()))?;
        lead.status = current.status;

        if current.status != LeadStatus::New {
            tracing::debug!(post_id = %post_id, status = %current.status, "Lead already handled");
            return Ok(Engagement::AlreadyHandled {
                status: current.status,
            });
        }

        if retry(policy, "outreach log lookup", || self.log.contains(&post_id)).await? {
            tracing::warn!(post_id = %post_id, "Lead has a logged reply but is still NEW, repairing status");
            self.set_status(lead, LeadStatus::Contacted).await?;
            return Ok(Engagement::AlreadyHandled {
                status: LeadStatus::Contacted,
            });
        }

        let unlogged = self.unlogged.lock().await.remove(&post_id);
        if let Some(sent) = unlogged {
            tracing::warn!(
                post_id = %post_id,
                reply_id = %sent.reply_id,
                "Reply already sent, recording it without resending"
            );
            return self.record(lead, sent).await;
        }

        if lead.score < threshold {
            if self.is_deferred() {
                return Ok(Engagement::Deferred { message: None });
            }
            self.set_status(lead, LeadStatus::Skipped).await?;
            tracing::info!(post_id = %post_id, score = lead.score, threshold, "Lead below threshold, skipped");
            return Ok(Engagement::Skipped);
        }

        let message = self.template.render(lead);

        if self.is_deferred() {
            tracing::info!(
                post_id = %post_id,
                score = lead.score,
                dry_run = self.config.dry_run,
                message = %message,
                "[DRY RUN] Would reply"
            );
            return Ok(Engagement::Deferred {
                message: Some(message),
            });
        }

        self.throttle.acquire().await;

        let receipt = retry(&self.config.send_retry, "reply", || {
            self.replier.reply(&post_id, &message)
        })
        .await
        .inspect_err(|e| {
            tracing::error!(post_id = %post_id, error = %e, "Failed to send reply, lead stays NEW");
        })?;

        let sent = UnloggedReply {
            reply_id: receipt.id,
            entry: OutreachLogEntry {
                post_id: post_id.clone(),
                post_url: lead.url.clone(),
                score: lead.score,
                message_sent: message,
                sent_at: self.clock.now(),
            },
        };
        self.record(lead, sent).await
    }

    /// Log a sent reply, then move the lead to CONTACTED
    async fn record(
        &self,
        lead: &mut Lead,
        sent: UnloggedReply,
    ) -> Result<Engagement, OutreachError> {
        let post_id = lead.post_id.clone();
        let appended = retry(&self.config.store_retry, "outreach log append", || {
            self.log.append(&sent.entry)
        })
        .await;

        if let Err(source) = appended {
            tracing::error!(
                post_id = %post_id,
                reply_id = %sent.reply_id,
                error = %source,
                "Reply sent but outreach log append failed"
            );
            let reply_id = sent.reply_id.clone();
            self.unlogged.lock().await.insert(post_id.clone(), sent);
            return Err(OutreachError::Unlogged {
                post_id,
                reply_id,
                source,
            });
        }

        self.set_status(lead, LeadStatus::Contacted).await?;

        tracing::info!(post_id = %post_id, reply_id = %sent.reply_id, score = lead.score, "Lead contacted");
        Ok(Engagement::Contacted(sent.entry))
    }

    async fn set_status(&self, lead: &mut Lead, status: LeadStatus) -> Result<(), RepositoryError> {
        retry(&self.config.store_retry, "lead status update", || {
            self.leads.set_status(&lead.post_id, status)
        })
        .await?;
        lead.status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::UpsertOutcome;
    use crate::usecases::testing::{FakeReplier, FixedClock, MemoryLeads, MemoryLog, lead};

    fn engine(
        replier: Arc<FakeReplier>,
        leads: Arc<MemoryLeads>,
        log: Arc<MemoryLog>,
        config: OutreachConfig,
    ) -> OutreachEngine<FakeReplier, MemoryLeads, MemoryLog, FixedClock> {
        OutreachEngine::new(replier, leads, log, Arc::new(FixedClock), config)
    }

    fn live_config() -> OutreachConfig {
        OutreachConfig {
            enabled: true,
            dry_run: false,
            template: Some("Hi {username}, about {title}".to_string()),
            throttle: ThrottleConfig::default(),
            send_retry: RetryPolicy::immediate(2),
            store_retry: RetryPolicy::immediate(2),
        }
    }

    #[tokio::test]
    async fn test_contacts_lead_above_threshold() {
        let replier = Arc::new(FakeReplier::new());
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 85);
        assert_eq!(leads.upsert(&target).await.unwrap(), UpsertOutcome::Inserted);

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        let engagement = engine.maybe_engage(&mut target, 70).await.unwrap();

        let entry = engagement.into_entry().expect("log entry");
        assert_eq!(entry.post_id, "p1");
        assert_eq!(entry.score, 85);
        assert_eq!(entry.message_sent, "Hi author_p1, about Title p1");
        assert_eq!(target.status, LeadStatus::Contacted);
        assert_eq!(leads.status_of("p1"), Some(LeadStatus::Contacted));
        assert_eq!(log.entries().len(), 1);
        assert_eq!(replier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_skips_lead_below_threshold() {
        let replier = Arc::new(FakeReplier::new());
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p2", 10);
        leads.upsert(&target).await.unwrap();

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        let engagement = engine.maybe_engage(&mut target, 70).await.unwrap();

        assert_eq!(engagement, Engagement::Skipped);
        assert_eq!(leads.status_of("p2"), Some(LeadStatus::Skipped));
        assert!(log.entries().is_empty());
        assert!(replier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_never_engages_twice() {
        let replier = Arc::new(FakeReplier::new());
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 90);
        leads.upsert(&target).await.unwrap();

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        engine.maybe_engage(&mut target, 70).await.unwrap();

        // A stale copy still claiming NEW must not trigger a second reply
        let mut stale = lead("p1", 90);
        let second = engine.maybe_engage(&mut stale, 70).await.unwrap();

        assert_eq!(
            second,
            Engagement::AlreadyHandled {
                status: LeadStatus::Contacted
            }
        );
        assert_eq!(stale.status, LeadStatus::Contacted);
        assert_eq!(replier.sent().len(), 1);
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_lead_new() {
        let replier = Arc::new(FakeReplier::failing(OutreachSendError::Api(
            "THREAD_LOCKED".to_string(),
        )));
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 90);
        leads.upsert(&target).await.unwrap();

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        let result = engine.maybe_engage(&mut target, 70).await;

        assert!(matches!(result, Err(OutreachError::Send(_))));
        assert_eq!(target.status, LeadStatus::New);
        assert_eq!(leads.status_of("p1"), Some(LeadStatus::New));
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_reply_is_retried() {
        let replier = Arc::new(FakeReplier::new());
        replier.fail_next(OutreachSendError::RateLimited(None));
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 90);
        leads.upsert(&target).await.unwrap();

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        let engagement = engine.maybe_engage(&mut target, 70).await.unwrap();

        assert!(matches!(engagement, Engagement::Contacted(_)));
        assert_eq!(replier.attempts(), 2);
        assert_eq!(replier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_composes_without_sending() {
        let replier = Arc::new(FakeReplier::new());
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 90);
        leads.upsert(&target).await.unwrap();

        let config = OutreachConfig {
            dry_run: true,
            ..live_config()
        };
        let engine = engine(replier.clone(), leads.clone(), log.clone(), config);
        let engagement = engine.maybe_engage(&mut target, 70).await.unwrap();

        assert_eq!(
            engagement,
            Engagement::Deferred {
                message: Some("Hi author_p1, about Title p1".to_string())
            }
        );
        assert_eq!(leads.status_of("p1"), Some(LeadStatus::New));
        assert!(replier.sent().is_empty());
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_repairs_status_when_log_entry_exists() {
        let replier = Arc::new(FakeReplier::new());
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 90);
        leads.upsert(&target).await.unwrap();
        log.append(&OutreachLogEntry {
            post_id: "p1".to_string(),
            post_url: target.url.clone(),
            score: 90,
            message_sent: "earlier reply".to_string(),
            sent_at: time::OffsetDateTime::UNIX_EPOCH,
        })
        .await
        .unwrap();

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        let engagement = engine.maybe_engage(&mut target, 70).await.unwrap();

        assert_eq!(
            engagement,
            Engagement::AlreadyHandled {
                status: LeadStatus::Contacted
            }
        );
        assert_eq!(leads.status_of("p1"), Some(LeadStatus::Contacted));
        assert!(replier.sent().is_empty());
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_unlogged_reply_is_recorded_without_resending() {
        let replier = Arc::new(FakeReplier::new());
        let leads = Arc::new(MemoryLeads::new());
        let log = Arc::new(MemoryLog::new());
        let mut target = lead("p1", 90);
        leads.upsert(&target).await.unwrap();
        log.fail_appends(3);

        let engine = engine(replier.clone(), leads.clone(), log.clone(), live_config());
        let first = engine.maybe_engage(&mut target, 70).await;

        assert!(matches!(
            &first,
            Err(OutreachError::Unlogged { reply_id, .. }) if reply_id == "t1_p1"
        ));
        assert!(first.unwrap_err().to_string().contains("t1_p1"));
        assert_eq!(leads.status_of("p1"), Some(LeadStatus::New));
        assert!(log.entries().is_empty());

        let second = engine.maybe_engage(&mut target, 70).await.unwrap();

        let entry = second.into_entry().expect("log entry");
        assert_eq!(entry.message_sent, "Hi author_p1, about Title p1");
        assert_eq!(replier.sent().len(), 1);
        assert_eq!(log.entries().len(), 1);
        assert_eq!(leads.status_of("p1"), Some(LeadStatus::Contacted));
    }

    #[tokio::test]
    async fn test_unknown_lead_is_an_error() {
        let engine = engine(
            Arc::new(FakeReplier::new()),
            Arc::new(MemoryLeads::new()),
            Arc::new(MemoryLog::new()),
            live_config(),
        );
        let mut missing = lead("ghost", 99);

        let result = engine.maybe_engage(&mut missing, 70).await;
        assert!(matches!(
            result,
            Err(OutreachError::Store(RepositoryError::NotFound(_)))
        ));
    }
}
