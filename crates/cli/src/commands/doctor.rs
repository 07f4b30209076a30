//! Doctor command - validate configuration and show status

use anyhow::Result;
use carelead_domain::usecases::OutreachTemplate;
use serde::Serialize;
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    store: CheckResult,
    source: CheckResult,
    llm: CheckResult,
    outreach: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        store: CheckResult::error("Not checked"),
        source: CheckResult::error("Not checked"),
        llm: CheckResult::error("Not checked"),
        outreach: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    match AppConfig::load(config_path.as_deref()) {
        Ok(config) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            report.store = check_store(&config);
            report.source = check_source(&config);
            report.llm = check_llm(&config);
            report.outreach = check_outreach(&config);
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
        }
    }

    let checks = [
        &report.config,
        &report.store,
        &report.source,
        &report.llm,
        &report.outreach,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

/// Whether an env var is set to something non-blank; the value is never returned
fn env_is_set(env_var: &str) -> bool {
    !env_var.trim().is_empty()
        && std::env::var(env_var)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
}

fn describe_env(env_var: &str) -> String {
    if env_is_set(env_var) {
        format!("{} (set)", env_var)
    } else {
        format!("{} (not set)", env_var)
    }
}

fn check_store(config: &AppConfig) -> CheckResult {
    match config.general.store.as_str() {
        "sqlite" => {
            let path = &config.general.sqlite_path;
            if path.exists() {
                CheckResult::ok(format!("SQLite store: {}", path.display()))
            } else {
                CheckResult::ok(format!(
                    "SQLite store: {} (created on first run)",
                    path.display()
                ))
            }
        }
        "airtable" => {
            let airtable = &config.airtable;
            let details = serde_json::json!({
                "leads_table": airtable.leads_table,
                "log_table": airtable.log_table,
            });
            if env_is_set(&airtable.base_id_env) && env_is_set(&airtable.api_key_env) {
                CheckResult::ok(format!(
                    "Airtable store: base {}, API key {}",
                    describe_env(&airtable.base_id_env),
                    describe_env(&airtable.api_key_env)
                ))
                .with_details(details)
            } else {
                CheckResult::error(format!(
                    "Airtable store: base {}, API key {}",
                    describe_env(&airtable.base_id_env),
                    describe_env(&airtable.api_key_env)
                ))
                .with_details(details)
            }
        }
        "memory" => CheckResult::warn("In-memory store: leads are not kept between runs"),
        other => CheckResult::error(format!("Unknown store backend: {}", other)),
    }
}

fn check_source(config: &AppConfig) -> CheckResult {
    let source = &config.source;
    if source.channels.is_empty() {
        return CheckResult::error("No channels configured");
    }

    let details = serde_json::json!({
        "channels": source.channels,
        "keywords": source.keywords,
    });

    match source.provider.as_str() {
        "reddit" => {
            let reddit = &source.reddit;
            let message = format!(
                "Reddit: client id {}, secret {}, {} channel(s)",
                describe_env(&reddit.client_id_env),
                describe_env(&reddit.client_secret_env),
                source.channels.len()
            );
            if env_is_set(&reddit.client_id_env) && env_is_set(&reddit.client_secret_env) {
                CheckResult::ok(message).with_details(details)
            } else {
                CheckResult::error(message).with_details(details)
            }
        }
        "stub" => match &source.stub_posts_file {
            Some(path) if !path.exists() => CheckResult::error(format!(
                "Stub source: posts file not found: {}",
                path.display()
            )),
            Some(path) => CheckResult::ok(format!("Stub source: {}", path.display())),
            None => CheckResult::warn("Stub source without a posts file: runs fetch nothing"),
        },
        other => CheckResult::error(format!("Unknown source provider: {}", other)),
    }
}

fn check_llm(config: &AppConfig) -> CheckResult {
    let provider = &config.llm.provider;
    let model = &config.llm.model;

    let api_key_env = match provider.as_str() {
        "openai" => &config.llm.openai.api_key_env,
        "anthropic" => &config.llm.anthropic.api_key_env,
        "openai_compat" => {
            if config.llm.openai_compat.base_url.trim().is_empty() {
                return CheckResult::error("Provider: openai_compat, base_url is empty");
            }
            &config.llm.openai_compat.api_key_env
        }
        "stub" => return CheckResult::ok("Provider: stub (offline heuristic)"),
        other => return CheckResult::error(format!("Unknown provider: {}", other)),
    };

    if api_key_env.is_empty() {
        return CheckResult::error(format!("No API key env var configured for {}", provider));
    }

    let message = format!(
        "Provider: {}, Model: {}, API key: {}",
        provider,
        model,
        describe_env(api_key_env)
    );
    if env_is_set(api_key_env) {
        CheckResult::ok(message)
    } else {
        CheckResult::warn(message)
    }
}

fn check_outreach(config: &AppConfig) -> CheckResult {
    let outreach = &config.outreach;

    if let Err(e) = OutreachTemplate::new(outreach.template.clone()).validate() {
        return CheckResult::error(format!("Invalid outreach template: {}", e));
    }

    if !outreach.enabled {
        return CheckResult::ok("Outreach disabled (leads are stored only)");
    }

    let details = serde_json::json!({
        "threshold": config.scoring.threshold,
        "per_minute": outreach.per_minute,
        "per_hour": outreach.per_hour,
        "min_interval_secs": outreach.min_interval_secs,
    });

    if config.general.dry_run {
        return CheckResult::ok("Outreach enabled, but general.dry_run is on").with_details(details);
    }

    if config.source.provider != "reddit" {
        return CheckResult::ok(format!("Outreach enabled via {} source", config.source.provider))
            .with_details(details);
    }

    let reddit = &config.source.reddit;
    let message = format!(
        "Outreach enabled: username {}, password {}",
        describe_env(&reddit.username_env),
        describe_env(&reddit.password_env)
    );
    if env_is_set(&reddit.username_env) && env_is_set(&reddit.password_env) {
        CheckResult::ok(message).with_details(details)
    } else {
        CheckResult::error(message).with_details(details)
    }
}

fn print_report(report: &DoctorReport) {
    println!("carelead Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Store", &report.store);
    print_check("Source", &report.source);
    print_check("LLM Provider", &report.llm);
    print_check("Outreach", &report.outreach);

    println!();
    println!(
        "{} Overall: {}",
        symbol(&report.overall),
        report.overall.to_uppercase()
    );

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: carelead run --dry-run");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    println!("{} {}: {}", symbol(&result.status), name, result.message);
}

fn symbol(status: &str) -> &'static str {
    match status {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    }
}
