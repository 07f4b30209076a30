//! carelead domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `retry`: Bounded retry policy shared by every adapter call
//! - `usecases`: Scoring, dedup, outreach, and the pipeline orchestrator

pub mod model;
pub mod ports;
pub mod retry;
pub mod usecases;

pub use model::*;
pub use ports::*;
pub use retry::{RetryPolicy, Retryable, retry};
