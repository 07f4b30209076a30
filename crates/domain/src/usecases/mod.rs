//! Application use cases / business logic

pub mod dedup;
pub mod outreach;
pub mod pipeline;
pub mod scoring;
pub mod template;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use dedup::DedupView;
pub use outreach::{Engagement, OutreachConfig, OutreachEngine, OutreachError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use scoring::{ScoringConfig, ScoringEngine, build_scoring_prompt, parse_score_response};
pub use template::{DEFAULT_MESSAGE, OutreachTemplate};
pub use throttle::{OutreachThrottle, ThrottleConfig};
