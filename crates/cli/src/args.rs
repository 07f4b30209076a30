//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// carelead: find home-care leads on Reddit, score them with an LLM, and reach out
#[derive(Parser, Debug)]
#[command(name = "carelead")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, score, store and reach out to new posts once
    Run(RunArgs),

    /// One-shot scoring of text
    Score(ScoreArgs),

    /// Reach out to stored leads that are still waiting
    Outreach(OutreachArgs),

    /// Inspect stored leads
    Leads(LeadsArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Score and store, but send no replies
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum number of posts to fetch across all channels
    #[arg(long)]
    pub limit: Option<usize>,

    /// Minimum score for outreach (0-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub threshold: Option<u8>,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Text to score
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// File containing text to score (use - for stdin)
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Channel the text was posted in
    #[arg(long, default_value = "manual")]
    pub channel: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct OutreachArgs {
    /// Minimum score for outreach (0-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub threshold: Option<u8>,

    /// Show what would be sent without sending
    #[arg(long)]
    pub dry_run: bool,

    /// Output the sweep summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct LeadsArgs {
    #[command(subcommand)]
    pub command: LeadsCommands,
}

#[derive(Subcommand, Debug)]
pub enum LeadsCommands {
    /// List stored leads
    List {
        /// Only leads with this status (NEW, CONTACTED, SKIPPED)
        #[arg(long)]
        status: Option<String>,

        /// Only leads scoring at least this much
        #[arg(long)]
        min_score: Option<u8>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./carelead.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
