//! Leads command - inspect stored leads

use anyhow::{Context, Result};
use carelead_domain::{Lead, LeadFilter, LeadRepository, LeadStatus};
use std::path::PathBuf;

use crate::args::{LeadsArgs, LeadsCommands};
use crate::commands::run::build_stores;
use crate::config::AppConfig;

pub async fn execute(args: LeadsArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        LeadsCommands::List {
            status,
            min_score,
            json,
        } => list_leads(status, min_score, json, config_path).await,
    }
}

async fn list_leads(
    status: Option<String>,
    min_score: Option<u8>,
    json: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let status = status
        .map(|s| s.parse::<LeadStatus>().map_err(anyhow::Error::msg))
        .transpose()?;
    let filter = LeadFilter { status, min_score };

    let stores = build_stores(&config).await?;
    let leads = stores
        .leads
        .list(&filter)
        .await
        .context("Failed to list leads")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&leads)?);
        return Ok(());
    }

    if leads.is_empty() {
        println!("No leads found");
        return Ok(());
    }

    println!("{} lead(s):", leads.len());
    println!();
    for lead in &leads {
        print_lead(lead);
    }

    Ok(())
}

fn print_lead(lead: &Lead) {
    let title = if lead.title.trim().is_empty() {
        "(untitled)"
    } else {
        lead.title.as_str()
    };
    println!(
        "{:>3}  {:<9}  r/{}  {}",
        lead.score,
        lead.status.as_str(),
        lead.channel,
        title
    );
    println!("     {}", lead.url);
    if !lead.rationale.is_empty() {
        println!("     {}", lead.rationale);
    }
}
