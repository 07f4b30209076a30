//! Run command - one pass of fetch, score, store and outreach

use anyhow::{Context, Result, bail};
use carelead_adapters::reddit::{
    RedditClient, RedditCredentials, RedditPostSource, RedditReplier, RedditSourceConfig,
    StubPostSource, StubReplier,
};
use carelead_adapters::store::{AirtableConfig, AirtableStore, InMemoryStore, SqliteStore};
use carelead_domain::usecases::{
    OutreachConfig as DomainOutreachConfig, OutreachEngine, Pipeline, PipelineConfig,
    ScoringEngine, ThrottleConfig,
};
use carelead_domain::{
    LeadRepository, OutreachLog, PostSource, ReplySender, RetryPolicy, RunSummary, SystemClock,
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::args::RunArgs;
use crate::commands::score::{build_inference, load_api_key, non_empty, scoring_config};
use crate::config::AppConfig;

/// Longest back-off between reply attempts while rate-limited
const MAX_SEND_BACKOFF: Duration = Duration::from_secs(900);

/// Lead repository and outreach log backed by the same store
pub(crate) struct Stores {
    pub leads: Arc<dyn LeadRepository>,
    pub log: Arc<dyn OutreachLog>,
}

/// Where posts come from and where replies go
pub(crate) struct Platform {
    pub source: Arc<dyn PostSource>,
    pub replier: Arc<dyn ReplySender>,
    /// False when the source has no user credentials to reply with
    pub can_reply: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let dry_run = args.dry_run || config.general.dry_run;
    let limit = args.limit.unwrap_or(config.general.limit);
    let threshold = args.threshold.unwrap_or(config.scoring.threshold);

    if config.source.channels.is_empty() {
        bail!("No channels configured (source.channels)");
    }

    let platform = build_platform(&config)?;
    ensure_can_reply(&config, &platform, dry_run)?;

    let stores = build_stores(&config).await?;
    let scorer = Arc::new(ScoringEngine::new(
        build_inference(&config)?,
        scoring_config(&config),
    ));
    let clock = Arc::new(SystemClock);

    let outreach = OutreachEngine::new(
        platform.replier,
        Arc::clone(&stores.leads),
        stores.log,
        Arc::clone(&clock),
        outreach_config(&config, dry_run),
    );

    let pipeline = Pipeline::new(
        platform.source,
        scorer,
        stores.leads,
        outreach,
        clock,
        PipelineConfig {
            channels: config.source.channels.clone(),
            limit,
            threshold,
            store_retry: store_retry(&config),
        },
    );

    if dry_run {
        tracing::info!("Running in dry-run mode: leads are stored, no replies are sent");
    } else if !config.outreach.enabled {
        tracing::info!("Outreach disabled: leads are stored, no replies are sent");
    }

    let summary = pipeline.run().await.context("Pipeline run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.is_partial() {
        tracing::warn!(errored = summary.errored, "Run finished with per-post errors");
    }

    Ok(())
}

/// Build the post source and replier for the configured provider
pub(crate) fn build_platform(config: &AppConfig) -> Result<Platform> {
    match config.source.provider.as_str() {
        "reddit" => {
            let client = Arc::new(RedditClient::new(reddit_credentials(config)?));
            let can_reply = client.can_reply();
            let source = RedditPostSource::new(
                Arc::clone(&client),
                RedditSourceConfig {
                    keywords: config.source.keywords.clone(),
                    page_size: config.source.page_size,
                    max_pages_per_channel: config.source.max_pages_per_channel,
                    retry: RetryPolicy {
                        max_retries: config.source.retries,
                        ..RetryPolicy::default()
                    },
                },
            );
            Ok(Platform {
                source: Arc::new(source),
                replier: Arc::new(RedditReplier::new(client)),
                can_reply,
            })
        }
        "stub" => {
            let source = match &config.source.stub_posts_file {
                Some(path) => StubPostSource::from_json_file(path)
                    .with_context(|| format!("Failed to load stub posts: {}", path.display()))?,
                None => StubPostSource::empty(),
            };
            Ok(Platform {
                source: Arc::new(source),
                replier: Arc::new(StubReplier::new()),
                can_reply: true,
            })
        }
        other => bail!("Unknown source provider: {}", other),
    }
}

/// Refuse to start a live run that could never send a reply
pub(crate) fn ensure_can_reply(config: &AppConfig, platform: &Platform, dry_run: bool) -> Result<()> {
    if config.outreach.enabled && !dry_run && !platform.can_reply {
        bail!(
            "Outreach is enabled but {} / {} are not set; set them or run with --dry-run",
            config.source.reddit.username_env,
            config.source.reddit.password_env
        );
    }
    Ok(())
}

fn reddit_credentials(config: &AppConfig) -> Result<RedditCredentials> {
    let reddit = &config.source.reddit;

    let client_id = std::env::var(&reddit.client_id_env)
        .ok()
        .and_then(|v| non_empty(&v))
        .with_context(|| format!("Missing Reddit client id env var {}", reddit.client_id_env))?;
    let client_secret = load_api_key(&reddit.client_secret_env, "reddit")?;

    let user_agent = optional_env(&reddit.user_agent_env).unwrap_or_else(|| reddit.user_agent.clone());
    let username = optional_env(&reddit.username_env);
    let password = optional_env(&reddit.password_env).map(|p| SecretString::new(p.into()));

    Ok(RedditCredentials {
        client_id,
        client_secret,
        user_agent,
        username,
        password,
        timeout_secs: config.source.timeout_secs,
    })
}

fn optional_env(env_var: &str) -> Option<String> {
    if env_var.trim().is_empty() {
        return None;
    }
    std::env::var(env_var).ok().and_then(|v| non_empty(&v))
}

/// Open the configured lead store
pub(crate) async fn build_stores(config: &AppConfig) -> Result<Stores> {
    match config.general.store.as_str() {
        "sqlite" => {
            let path = &config.general.sqlite_path;
            let store = Arc::new(
                SqliteStore::new(path)
                    .await
                    .with_context(|| format!("Failed to open lead store: {}", path.display()))?,
            );
            Ok(Stores {
                leads: store.clone(),
                log: store,
            })
        }
        "airtable" => {
            let airtable = &config.airtable;
            let base_id = optional_env(&airtable.base_id_env).with_context(|| {
                format!("Missing Airtable base id env var {}", airtable.base_id_env)
            })?;
            let store = Arc::new(AirtableStore::new(AirtableConfig {
                base_id,
                leads_table: airtable.leads_table.clone(),
                log_table: airtable.log_table.clone(),
                api_key: load_api_key(&airtable.api_key_env, "airtable")?,
                timeout_secs: airtable.timeout_secs,
            }));
            Ok(Stores {
                leads: store.clone(),
                log: store,
            })
        }
        "memory" => {
            tracing::warn!("Using in-memory store: leads are not kept between runs");
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                leads: store.clone(),
                log: store,
            })
        }
        other => bail!("Unknown store backend: {}", other),
    }
}

pub(crate) fn store_retry(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.general.store_retries,
        ..RetryPolicy::default()
    }
}

pub(crate) fn outreach_config(config: &AppConfig, dry_run: bool) -> DomainOutreachConfig {
    let outreach = &config.outreach;
    DomainOutreachConfig {
        enabled: outreach.enabled,
        dry_run,
        template: outreach.template.clone(),
        throttle: ThrottleConfig {
            per_minute: (outreach.per_minute > 0).then_some(outreach.per_minute),
            per_hour: (outreach.per_hour > 0).then_some(outreach.per_hour),
            min_interval: Duration::from_secs(outreach.min_interval_secs),
        },
        send_retry: RetryPolicy {
            max_retries: outreach.rate_limit_retries,
            base_delay: Duration::from_secs(outreach.rate_limit_backoff_secs),
            max_delay: MAX_SEND_BACKOFF,
        },
        store_retry: store_retry(config),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("Run {}", summary.run_id);
    println!("  fetched:    {}", summary.fetched);
    println!("  processed:  {}", summary.processed);
    println!("  duplicates: {}", summary.duplicates);
    println!("  skipped:    {}", summary.skipped);
    println!("  contacted:  {}", summary.contacted);
    println!("  pending:    {}", summary.pending);
    println!("  errored:    {}", summary.errored);

    for (post_id, outcome) in summary.outcomes.iter().filter(|(_, o)| o.is_error()) {
        println!("  ! {} {}: {:?}", post_id, outcome.label(), outcome);
    }
}
