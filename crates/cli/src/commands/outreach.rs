//! Outreach command - reach out to stored NEW leads at or above the threshold

use anyhow::{Context, Result};
use carelead_domain::usecases::{Engagement, OutreachEngine};
use carelead_domain::{LeadFilter, LeadRepository, LeadStatus, SystemClock, retry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::OutreachArgs;
use crate::commands::run::{
    build_platform, build_stores, ensure_can_reply, outreach_config, store_retry,
};
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct SweepResult {
    post_id: String,
    score: u8,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn execute(args: OutreachArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let dry_run = args.dry_run || config.general.dry_run;
    let threshold = args.threshold.unwrap_or(config.scoring.threshold);

    let platform = build_platform(&config)?;
    ensure_can_reply(&config, &platform, dry_run)?;
    let stores = build_stores(&config).await?;

    let policy = store_retry(&config);
    let filter = LeadFilter {
        status: Some(LeadStatus::New),
        min_score: Some(threshold),
    };
    let pending = retry(&policy, "lead list", || stores.leads.list(&filter))
        .await
        .context("Failed to list pending leads")?;

    tracing::info!(count = pending.len(), threshold, dry_run, "Sweeping pending leads");

    let engine = OutreachEngine::new(
        platform.replier,
        Arc::clone(&stores.leads),
        stores.log,
        Arc::new(SystemClock),
        outreach_config(&config, dry_run),
    );

    let mut results = Vec::with_capacity(pending.len());
    for mut lead in pending {
        let (outcome, message, error) = match engine.maybe_engage(&mut lead, threshold).await {
            Ok(Engagement::Contacted(entry)) => ("contacted", Some(entry.message_sent), None),
            Ok(Engagement::Skipped) => ("skipped", None, None),
            Ok(Engagement::Deferred { message }) => ("pending", message, None),
            Ok(Engagement::AlreadyHandled { .. }) => ("already_handled", None, None),
            Err(e) => ("error", None, Some(e.to_string())),
        };
        results.push(SweepResult {
            post_id: lead.post_id,
            score: lead.score,
            outcome,
            message,
            error,
        });
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        tracing::warn!(failed, "Some leads could not be contacted and stay NEW");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results, dry_run);
    }

    Ok(())
}

fn print_results(results: &[SweepResult], dry_run: bool) {
    if results.is_empty() {
        println!("No pending leads");
        return;
    }

    for result in results {
        println!("{} ({}): {}", result.post_id, result.score, result.outcome);
        if let Some(error) = &result.error {
            println!("  error: {}", error);
        }
        if dry_run {
            if let Some(message) = &result.message {
                for line in message.lines() {
                    println!("  > {}", line);
                }
            }
        }
    }
}
