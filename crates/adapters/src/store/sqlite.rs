//! SQLite store implementation

use async_trait::async_trait;
use carelead_domain::{
    Lead, LeadFilter, LeadRepository, LeadStatus, OutreachLog, OutreachLogEntry, RepositoryError,
    UpsertOutcome, ensure_transition,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const LEAD_COLUMNS: &str = "post_id, channel, title, text, author, url, score, rationale, \
                            status, posted_at, scored_at";

type LeadRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    String,
    String,
);

/// SQLite-backed leads table and outreach log
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and apply migrations
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RepositoryError::Write(format!("Failed to create directory: {}", e))
            })?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| RepositoryError::Write(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, RepositoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| RepositoryError::Write(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                post_id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                title TEXT NOT NULL,
                text TEXT NOT NULL,
                author TEXT NOT NULL,
                url TEXT NOT NULL,
                score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
                rationale TEXT NOT NULL,
                status TEXT NOT NULL,
                posted_at TEXT NOT NULL,
                scored_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Write(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outreach_log (
                post_id TEXT PRIMARY KEY,
                post_url TEXT NOT NULL,
                score INTEGER NOT NULL,
                message_sent TEXT NOT NULL,
                sent_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Write(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status, score)")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Write(e.to_string()))?;

        Ok(())
    }
}

fn format_time(value: OffsetDateTime) -> Result<String, RepositoryError> {
    value
        .format(&Rfc3339)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn parse_time(value: &str) -> Result<OffsetDateTime, RepositoryError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn lead_from_row(row: LeadRow) -> Result<Lead, RepositoryError> {
    let (post_id, channel, title, text, author, url, score, rationale, status, posted, scored) =
        row;

    Ok(Lead {
        score: u8::try_from(score)
            .map_err(|_| RepositoryError::Serialization(format!("Score out of range: {}", score)))?,
        status: status.parse().map_err(RepositoryError::Serialization)?,
        posted_at: parse_time(&posted)?,
        scored_at: parse_time(&scored)?,
        post_id,
        channel,
        title,
        text,
        author,
        url,
        rationale,
    })
}

#[async_trait]
impl LeadRepository for SqliteStore {
    async fn get(&self, post_id: &str) -> Result<Option<Lead>, RepositoryError> {
        let row: Option<LeadRow> =
            sqlx::query_as(&format!("SELECT {} FROM leads WHERE post_id = ?", LEAD_COLUMNS))
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::Read(e.to_string()))?;

        row.map(lead_from_row).transpose()
    }

    async fn upsert(&self, lead: &Lead) -> Result<UpsertOutcome, RepositoryError> {
        let result = sqlx::query(&format!(
            "INSERT INTO leads ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(post_id) DO NOTHING",
            LEAD_COLUMNS
        ))
        .bind(&lead.post_id)
        .bind(&lead.channel)
        .bind(&lead.title)
        .bind(&lead.text)
        .bind(&lead.author)
        .bind(&lead.url)
        .bind(i64::from(lead.score))
        .bind(&lead.rationale)
        .bind(lead.status.as_str())
        .bind(format_time(lead.posted_at)?)
        .bind(format_time(lead.scored_at)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Write(e.to_string()))?;

        if result.rows_affected() == 0 {
            Ok(UpsertOutcome::AlreadyExists)
        } else {
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn set_status(&self, post_id: &str, status: LeadStatus) -> Result<(), RepositoryError> {
        let current = self
            .get(post_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(post_id.to_string()))?;
        ensure_transition(post_id, current.status, status)?;

        // Only a NEW row moves, even if another writer got there first
        let result = sqlx::query("UPDATE leads SET status = ? WHERE post_id = ? AND status = ?")
            .bind(status.as_str())
            .bind(post_id)
            .bind(LeadStatus::New.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Write(e.to_string()))?;

        if result.rows_affected() == 0 {
            let from = self
                .get(post_id)
                .await?
                .map(|lead| lead.status)
                .unwrap_or(current.status);
            return Err(RepositoryError::InvalidTransition {
                post_id: post_id.to_string(),
                from,
                to: status,
            });
        }

        Ok(())
    }

    async fn list(&self, filter: &LeadFilter) -> Result<Vec<Lead>, RepositoryError> {
        let status = filter.status.map(LeadStatus::as_str);
        let min_score = filter.min_score.map(i64::from);
        let rows: Vec<LeadRow> = sqlx::query_as(&format!(
            "SELECT {} FROM leads \
             WHERE (? IS NULL OR status = ?) AND (? IS NULL OR score >= ?) \
             ORDER BY scored_at, post_id",
            LEAD_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .bind(min_score)
        .bind(min_score)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Read(e.to_string()))?;

        rows.into_iter().map(lead_from_row).collect()
    }
}

#[async_trait]
impl OutreachLog for SqliteStore {
    async fn append(&self, entry: &OutreachLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO outreach_log (post_id, post_url, score, message_sent, sent_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(post_id) DO NOTHING
            "#,
        )
        .bind(&entry.post_id)
        .bind(&entry.post_url)
        .bind(i64::from(entry.score))
        .bind(&entry.message_sent)
        .bind(format_time(entry.sent_at)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Write(e.to_string()))?;

        Ok(())
    }

    async fn contains(&self, post_id: &str) -> Result<bool, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outreach_log WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::Read(e.to_string()))?;

        Ok(count.0 > 0)
    }

    async fn list(&self) -> Result<Vec<OutreachLogEntry>, RepositoryError> {
        let rows: Vec<(String, String, i64, String, String)> = sqlx::query_as(
            "SELECT post_id, post_url, score, message_sent, sent_at FROM outreach_log \
             ORDER BY sent_at, post_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Read(e.to_string()))?;

        rows.into_iter()
            .map(|(post_id, post_url, score, message_sent, sent_at)| {
                Ok(OutreachLogEntry {
                    post_id,
                    post_url,
                    score: u8::try_from(score).map_err(|_| {
                        RepositoryError::Serialization(format!("Score out of range: {}", score))
                    })?,
                    message_sent,
                    sent_at: parse_time(&sent_at)?,
                })
            })
            .collect()
    }
}
