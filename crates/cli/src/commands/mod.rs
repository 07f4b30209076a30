//! Subcommand implementations

pub mod config;
pub mod doctor;
pub mod leads;
pub mod outreach;
pub mod run;
pub mod score;
