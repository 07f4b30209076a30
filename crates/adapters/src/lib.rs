//! carelead adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `reddit`: Reddit post source and replier (plus offline stubs)
//! - `llm`: Inference providers (OpenAI-compatible, Anthropic, stub)
//! - `store`: Airtable, SQLite and in-memory lead stores and outreach logs

pub mod llm;
pub mod reddit;
pub mod store;
