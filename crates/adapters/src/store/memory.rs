//! In-memory store for testing and offline mode

use async_trait::async_trait;
use carelead_domain::{
    Lead, LeadFilter, LeadRepository, LeadStatus, OutreachLog, OutreachLogEntry, RepositoryError,
    UpsertOutcome, ensure_transition,
};
use std::sync::RwLock;

/// In-memory leads and outreach log, kept in insertion order
pub struct InMemoryStore {
    leads: RwLock<Vec<Lead>>,
    log: RwLock<Vec<OutreachLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            leads: RwLock::new(Vec::new()),
            log: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadRepository for InMemoryStore {
    async fn get(&self, post_id: &str) -> Result<Option<Lead>, RepositoryError> {
        let leads = self
            .leads
            .read()
            .map_err(|e| RepositoryError::Read(e.to_string()))?;
        Ok(leads.iter().find(|l| l.post_id == post_id).cloned())
    }

    async fn upsert(&self, lead: &Lead) -> Result<UpsertOutcome, RepositoryError> {
        let mut leads = self
            .leads
            .write()
            .map_err(|e| RepositoryError::Write(e.to_string()))?;
        if leads.iter().any(|l| l.post_id == lead.post_id) {
            return Ok(UpsertOutcome::AlreadyExists);
        }
        leads.push(lead.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn set_status(&self, post_id: &str, status: LeadStatus) -> Result<(), RepositoryError> {
        let mut leads = self
            .leads
            .write()
            .map_err(|e| RepositoryError::Write(e.to_string()))?;
        let lead = leads
            .iter_mut()
            .find(|l| l.post_id == post_id)
            .ok_or_else(|| RepositoryError::NotFound(post_id.to_string()))?;
        ensure_transition(post_id, lead.status, status)?;
        lead.status = status;
        Ok(())
    }

    async fn list(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError> {
        let leads = self
            .leads
            .read()
            .map_err(|e| RepositoryError::Read(e.to_string()))?;
        Ok(leads.iter().filter(|l| filter.matches(l)).cloned().collect())
    }
}

#[async_trait]
impl OutreachLog for InMemoryStore {
    async fn append(&self, entry: &OutreachLogEntry) -> Result<(), RepositoryError> {
        let mut log = self
            .log
            .write()
            .map_err(|e| RepositoryError::Write(e.to_string()))?;
        if !log.iter().any(|e| e.post_id == entry.post_id) {
            log.push(entry.clone());
        }
        Ok(())
    }

    async fn contains(&self, post_id: &str) -> Result<bool, RepositoryError> {
        let log = self
            .log
            .read()
            .map_err(|e| RepositoryError::Read(e.to_string()))?;
        Ok(log.iter().any(|e| e.post_id == post_id))
    }

    async fn list(&self) -> Result<Vec<OutreachLogEntry>, RepositoryError> {
        let log = self
            .log
            .read()
            .map_err(|e| RepositoryError::Read(e.to_string()))?;
        Ok(log.clone())
    }
}
