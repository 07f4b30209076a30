//! Airtable store: a Leads table and an Outreach Log table in one base
//!
//! Column names match the agency's existing base so rows written here line up
//! with what people already see in the Airtable UI.

use async_trait::async_trait;
use carelead_domain::{
    Lead, LeadFilter, LeadRepository, LeadStatus, OutreachLog, OutreachLogEntry, RepositoryError,
    UpsertOutcome, ensure_transition,
};
use reqwest::{Client, RequestBuilder, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

const AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";
const PAGE_SIZE: &str = "100";
const LEAD_SOURCE: &str = "Reddit";
const LEAD_URL_FIELD: &str = "Source URL";
const LOG_URL_FIELD: &str = "Post URL";

/// Connection settings for one Airtable base
#[derive(Clone)]
pub struct AirtableConfig {
    pub base_id: String,
    pub leads_table: String,
    pub log_table: String,
    pub api_key: SecretString,
    pub timeout_secs: u64,
}

pub struct AirtableStore {
    client: Client,
    config: AirtableConfig,
    base_url: String,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn error(self, message: String) -> RepositoryError {
        match self {
            Access::Read => RepositoryError::Read(message),
            Access::Write => RepositoryError::Write(message),
        }
    }
}

impl AirtableStore {
    pub fn new(config: AirtableConfig) -> Self {
        Self::with_base_url(config, AIRTABLE_API_URL.to_string())
    }

    pub fn with_base_url(config: AirtableConfig, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build Airtable HTTP client, using defaults");
                Client::new()
            });

        Self {
            client,
            config,
            base_url,
        }
    }

    /// `{base_url}/{base_id}/{table}[/{record_id}]`, with the table name escaped
    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, RepositoryError> {
        let invalid = || RepositoryError::Read(format!("Invalid Airtable URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
            segments.pop_if_empty().push(&self.config.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        access: Access,
    ) -> Result<T, RepositoryError> {
        let response = request
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| access.error(format!("Airtable request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(access.error(format!("Airtable returned {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| RepositoryError::Serialization(format!("Invalid Airtable response: {}", e)))
    }

    /// Fetch every record matching `formula`, following `offset` pagination
    async fn fetch_records<F: DeserializeOwned>(
        &self,
        table: &str,
        formula: Option<&str>,
    ) -> Result<Vec<Record<F>>, RepositoryError> {
        let url = self.table_url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(formula) = formula {
                query.push(("filterByFormula", formula.to_string()));
            }
            if let Some(offset) = &offset {
                query.push(("offset", offset.clone()));
            }

            let page: RecordPage<F> = self
                .send(self.client.get(url.clone()).query(&query), Access::Read)
                .await?;
            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!(table, count = records.len(), "Fetched Airtable records");
        Ok(records)
    }

    /// Rows written by hand or by older tooling may lack "Post ID", so the
    /// post URL is matched too
    async fn find_lead(
        &self,
        post_id: &str,
        url: Option<&str>,
    ) -> Result<Option<Record<LeadFields>>, RepositoryError> {
        let formula = post_formula(post_id, LEAD_URL_FIELD, url);
        let records = self
            .fetch_records(&self.config.leads_table, Some(&formula))
            .await?;
        Ok(records.into_iter().next())
    }

    async fn create<F: Serialize>(&self, table: &str, fields: &F) -> Result<(), RepositoryError> {
        let url = self.table_url(table, None)?;
        let body = CreateRequest {
            fields,
            typecast: true,
        };
        let _: Record<serde_json::Value> = self
            .send(self.client.post(url).json(&body), Access::Write)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LeadRepository for AirtableStore {
    async fn get(&self, post_id: &str) -> Result<Option<Lead>, RepositoryError> {
        self.find_lead(post_id, None)
            .await?
            .map(|record| {
                let key = record.fields.key().unwrap_or_else(|| post_id.to_string());
                record.fields.into_lead(key)
            })
            .transpose()
    }

    async fn upsert(&self, lead: &Lead) -> Result<UpsertOutcome, RepositoryError> {
        if self
            .find_lead(&lead.post_id, Some(&lead.url))
            .await?
            .is_some()
        {
            return Ok(UpsertOutcome::AlreadyExists);
        }

        self.create(&self.config.leads_table, &LeadFields::from_lead(lead)?)
            .await?;
        tracing::debug!(post_id = %lead.post_id, "Created Airtable lead");
        Ok(UpsertOutcome::Inserted)
    }

    async fn set_status(&self, post_id: &str, status: LeadStatus) -> Result<(), RepositoryError> {
        let record = self
            .find_lead(post_id, None)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(post_id.to_string()))?;
        let current = parse_status(&record.fields.status)?;
        ensure_transition(post_id, current, status)?;

        let url = self.table_url(&self.config.leads_table, Some(&record.id))?;
        let body = serde_json::json!({ "fields": { "Outreach Status": status_label(status) } });
        let _: Record<serde_json::Value> = self
            .send(self.client.patch(url).json(&body), Access::Write)
            .await?;
        Ok(())
    }

    async fn list(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError> {
        let mut clauses = vec![];
        if let Some(status) = filter.status {
            clauses.push(format!("{{Outreach Status}} = '{}'", status_label(status)));
        }
        if let Some(min_score) = filter.min_score {
            clauses.push(format!("{{Confidence Score}} >= {}", min_score));
        }
        let formula = match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(format!("AND({})", clauses.join(", "))),
        };

        self.fetch_records::<LeadFields>(&self.config.leads_table, formula.as_deref())
            .await?
            .into_iter()
            .filter_map(|record| match record.fields.key() {
                Some(key) => Some(record.fields.into_lead(key)),
                None => {
                    tracing::warn!(record_id = %record.id, "Skipping Airtable lead without a post ID or URL");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl OutreachLog for AirtableStore {
    async fn append(&self, entry: &OutreachLogEntry) -> Result<(), RepositoryError> {
        if self.contains(&entry.post_id).await? {
            return Ok(());
        }
        self.create(&self.config.log_table, &LogFields::from_entry(entry)?)
            .await
    }

    async fn contains(&self, post_id: &str) -> Result<bool, RepositoryError> {
        let formula = post_formula(post_id, LOG_URL_FIELD, None);
        let records = self
            .fetch_records::<serde_json::Value>(&self.config.log_table, Some(&formula))
            .await?;
        Ok(!records.is_empty())
    }

    async fn list(&self) -> Result<Vec<OutreachLogEntry>, RepositoryError> {
        self.fetch_records::<LogFields>(&self.config.log_table, None)
            .await?
            .into_iter()
            .filter_map(|record| match record.fields.key() {
                Some(key) => Some(record.fields.into_entry(key)),
                None => {
                    tracing::warn!(record_id = %record.id, "Skipping Airtable log row without a post ID or URL");
                    None
                }
            })
            .collect()
    }
}

fn escape(literal: &str) -> String {
    literal.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Airtable formula matching one post by "Post ID", by the post's comments
/// path inside `url_field`, or by an exact URL when one is known
fn post_formula(post_id: &str, url_field: &str, url: Option<&str>) -> String {
    let id = escape(post_id);
    let mut clauses = vec![
        format!("{{Post ID}} = '{}'", id),
        format!("FIND('/comments/{}/', {{{}}})", id, url_field),
    ];
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        clauses.push(format!("{{{}}} = '{}'", url_field, escape(url)));
    }
    format!("OR({})", clauses.join(", "))
}

/// `.../comments/{id}/...` -> `id`
fn post_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/comments/")?;
    let id = rest.split(['/', '?', '#']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

fn row_key(post_id: &str, url: &str) -> Option<String> {
    let post_id = post_id.trim();
    if post_id.is_empty() {
        post_id_from_url(url)
    } else {
        Some(post_id.to_string())
    }
}

fn status_label(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::New => "Not Contacted",
        LeadStatus::Contacted => "Contacted",
        LeadStatus::Skipped => "Skipped",
    }
}

fn parse_status(label: &str) -> Result<LeadStatus, RepositoryError> {
    match label.trim() {
        "" | "Not Contacted" => Ok(LeadStatus::New),
        "Contacted" => Ok(LeadStatus::Contacted),
        "Skipped" => Ok(LeadStatus::Skipped),
        other => other.parse().map_err(RepositoryError::Serialization),
    }
}

fn format_time(value: OffsetDateTime) -> Result<String, RepositoryError> {
    value
        .format(&Rfc3339)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// RFC 3339, or a bare Airtable date field (`YYYY-MM-DD`) read as midnight UTC
fn parse_time(value: &str) -> Result<OffsetDateTime, RepositoryError> {
    let value = value.trim();
    OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| {
            Date::parse(value, format_description!("[year]-[month]-[day]"))
                .map(|date| date.midnight().assume_utc())
        })
        .map_err(|e| RepositoryError::Serialization(format!("Invalid timestamp {:?}: {}", value, e)))
}

fn to_score(value: f64) -> Result<u8, RepositoryError> {
    if (0.0..=100.0).contains(&value) {
        Ok(value.round() as u8)
    } else {
        Err(RepositoryError::Serialization(format!(
            "Confidence Score out of range: {}",
            value
        )))
    }
}

#[derive(Deserialize)]
struct RecordPage<F> {
    records: Vec<Record<F>>,
    offset: Option<String>,
}

#[derive(Deserialize)]
struct Record<F> {
    id: String,
    fields: F,
}

#[derive(Serialize)]
struct CreateRequest<'a, F> {
    fields: &'a F,
    typecast: bool,
}

#[derive(Serialize, Deserialize)]
struct LeadFields {
    #[serde(rename = "Post ID", default)]
    post_id: String,
    #[serde(rename = "Subreddit", default)]
    channel: String,
    #[serde(rename = "Full Name or Listing Title", default)]
    title: String,
    #[serde(rename = "Post Description / Notes", default)]
    text: String,
    #[serde(rename = "Reddit Username", default)]
    author: String,
    #[serde(rename = "Source URL", default)]
    url: String,
    #[serde(rename = "Confidence Score", default)]
    score: f64,
    #[serde(rename = "Confidence Reason", default)]
    rationale: String,
    #[serde(rename = "Outreach Status", default)]
    status: String,
    #[serde(rename = "Lead Source", default)]
    source: String,
    #[serde(rename = "Date Posted", default)]
    posted_at: String,
    #[serde(rename = "Scored At", default)]
    scored_at: String,
}

impl LeadFields {
    fn from_lead(lead: &Lead) -> Result<Self, RepositoryError> {
        Ok(Self {
            post_id: lead.post_id.clone(),
            channel: lead.channel.clone(),
            title: lead.title.clone(),
            text: lead.text.clone(),
            author: lead.author.clone(),
            url: lead.url.clone(),
            score: f64::from(lead.score),
            rationale: lead.rationale.clone(),
            status: status_label(lead.status).to_string(),
            source: LEAD_SOURCE.to_string(),
            posted_at: format_time(lead.posted_at)?,
            scored_at: format_time(lead.scored_at)?,
        })
    }

    fn key(&self) -> Option<String> {
        row_key(&self.post_id, &self.url)
    }

    fn into_lead(self, post_id: String) -> Result<Lead, RepositoryError> {
        let posted_at = parse_time(&self.posted_at)?;
        // Rows scored before "Scored At" existed
        let scored_at = if self.scored_at.trim().is_empty() {
            posted_at
        } else {
            parse_time(&self.scored_at)?
        };
        Ok(Lead {
            score: to_score(self.score)?,
            status: parse_status(&self.status)?,
            posted_at,
            scored_at,
            post_id,
            channel: self.channel,
            title: self.title,
            text: self.text,
            author: self.author,
            url: self.url,
            rationale: self.rationale,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct LogFields {
    #[serde(rename = "Post ID", default)]
    post_id: String,
    #[serde(rename = "Post URL", default)]
    post_url: String,
    #[serde(rename = "Confidence Score", default)]
    score: f64,
    #[serde(rename = "Message Sent", default)]
    message_sent: String,
    #[serde(rename = "Timestamp")]
    sent_at: String,
}

impl LogFields {
    fn from_entry(entry: &OutreachLogEntry) -> Result<Self, RepositoryError> {
        Ok(Self {
            post_id: entry.post_id.clone(),
            post_url: entry.post_url.clone(),
            score: f64::from(entry.score),
            message_sent: entry.message_sent.clone(),
            sent_at: format_time(entry.sent_at)?,
        })
    }

    fn key(&self) -> Option<String> {
        row_key(&self.post_id, &self.post_url)
    }

    fn into_entry(self, post_id: String) -> Result<OutreachLogEntry, RepositoryError> {
        Ok(OutreachLogEntry {
            score: to_score(self.score)?,
            sent_at: parse_time(&self.sent_at)?,
            post_id,
            post_url: self.post_url,
            message_sent: self.message_sent,
        })
    }
}
