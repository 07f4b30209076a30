//! Deduplication view over the lead repository
//!
//! A post is "seen" iff a lead with its ID exists. There is no separate
//! store: marking a post seen is the lead upsert itself.

use std::sync::Arc;

use crate::model::Lead;
use crate::ports::{LeadRepository, RepositoryError, UpsertOutcome};

pub struct DedupView<L: LeadRepository + ?Sized> {
    leads: Arc<L>,
}

impl<L: LeadRepository + ?Sized> Clone for DedupView<L> {
    fn clone(&self) -> Self {
        Self {
            leads: Arc::clone(&self.leads),
        }
    }
}

impl<L: LeadRepository + ?Sized> DedupView<L> {
    pub fn new(leads: Arc<L>) -> Self {
        Self { leads }
    }

    pub async fn has_seen(&self, post_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.leads.get(post_id).await?.is_some())
    }

    /// The existing lead for a post, if it has been seen
    pub async fn lookup(&self, post_id: &str) -> Result<Option<Lead>, RepositoryError> {
        self.leads.get(post_id).await
    }

    /// Record a post as seen by storing its lead. A second call for the same
    /// post ID writes nothing.
    pub async fn mark_seen(&self, lead: &Lead) -> Result<UpsertOutcome, RepositoryError> {
        self.leads.upsert(lead).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::testing::{MemoryLeads, lead};

    #[tokio::test]
    async fn test_seen_iff_lead_exists() {
        let leads = Arc::new(MemoryLeads::new());
        let dedup = DedupView::new(leads.clone());

        assert!(!dedup.has_seen("p1").await.unwrap());
        assert_eq!(
            dedup.mark_seen(&lead("p1", 50)).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert!(dedup.has_seen("p1").await.unwrap());
        assert!(!dedup.has_seen("p2").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_seen_twice_keeps_one_row() {
        let leads = Arc::new(MemoryLeads::new());
        let dedup = DedupView::new(leads.clone());

        dedup.mark_seen(&lead("p1", 50)).await.unwrap();
        let second = dedup.mark_seen(&lead("p1", 99)).await.unwrap();

        assert_eq!(second, UpsertOutcome::AlreadyExists);
        assert_eq!(leads.len(), 1);
        assert_eq!(dedup.lookup("p1").await.unwrap().unwrap().score, 50);
    }
}
