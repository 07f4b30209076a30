//! Lead and outreach-log stores
//!
//! Each backend implements both `LeadRepository` and `OutreachLog`, so the two
//! tables always live side by side.

pub mod airtable;
mod memory;
mod sqlite;

pub use airtable::{AirtableConfig, AirtableStore};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[cfg(test)]
pub(crate) mod test_support {
    use carelead_domain::{Lead, LeadStatus, OutreachLogEntry};
    use time::OffsetDateTime;
    use time::macros::datetime;

    pub fn lead(post_id: &str, score: u8) -> Lead {
        Lead {
            post_id: post_id.to_string(),
            channel: "caregivers".to_string(),
            title: "Need help with mom".to_string(),
            text: "Looking for a companion in New Haven".to_string(),
            author: "someone".to_string(),
            url: format!("https://www.reddit.com/r/caregivers/comments/{}/", post_id),
            score,
            rationale: "Local care need".to_string(),
            status: LeadStatus::New,
            posted_at: datetime!(2024-03-01 12:00 UTC),
            scored_at: datetime!(2024-03-01 12:05 UTC),
        }
    }

    pub fn entry(post_id: &str) -> OutreachLogEntry {
        OutreachLogEntry {
            post_id: post_id.to_string(),
            post_url: format!("https://www.reddit.com/r/caregivers/comments/{}/", post_id),
            score: 90,
            message_sent: "Hi there".to_string(),
            sent_at: OffsetDateTime::UNIX_EPOCH,
        }
    }
}
