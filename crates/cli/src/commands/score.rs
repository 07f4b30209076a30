//! Score command - one-shot lead scoring of text

use anyhow::{Context, Result, bail};
use carelead_adapters::llm::{
    AnthropicInference, LlmConfig as AdapterLlmConfig, OpenAiCompatInference, StubInference,
};
use carelead_domain::usecases::{ScoringConfig as DomainScoringConfig, ScoringEngine};
use carelead_domain::{Inference, Post, RetryPolicy, Scorer};
use secrecy::SecretString;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::args::ScoreArgs;
use crate::config::{AppConfig, LlmConfig};

pub async fn execute(args: ScoreArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let text = get_input_text(&args)?;
    if text.trim().is_empty() {
        bail!("No text provided");
    }

    let inference = build_inference(&config)?;
    let engine = ScoringEngine::new(inference, scoring_config(&config));

    let post = Post {
        id: "manual".to_string(),
        channel: args.channel.clone(),
        title: String::new(),
        text,
        author: String::new(),
        url: String::new(),
        created_at: OffsetDateTime::now_utc(),
    };

    let result = engine.score(&post).await.context("Scoring failed")?;
    let threshold = config.scoring.threshold;
    let qualifies = result.score >= threshold;

    if args.json {
        let output = serde_json::json!({
            "score": result.score,
            "rationale": result.rationale,
            "threshold": threshold,
            "qualifies": qualifies,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Score: {}/100", result.score);
        println!("Reason: {}", result.rationale);
        if qualifies {
            println!("Qualifies for outreach (threshold {})", threshold);
        } else {
            println!("Below outreach threshold ({})", threshold);
        }
    }

    Ok(())
}

/// Build the configured inference provider
pub(crate) fn build_inference(config: &AppConfig) -> Result<Arc<dyn Inference>> {
    let llm = &config.llm;
    let provider = llm.provider.as_str();
    let adapter_config = adapter_llm_config(llm);

    tracing::debug!(provider, model = %llm.model, "Building inference provider");

    let inference: Arc<dyn Inference> = match provider {
        "openai" => {
            let api_key = load_api_key(&llm.openai.api_key_env, provider)?;
            match non_empty(&llm.openai.base_url) {
                Some(base_url) => Arc::new(OpenAiCompatInference::with_base_url(
                    api_key,
                    base_url,
                    adapter_config,
                )),
                None => Arc::new(OpenAiCompatInference::new(api_key, adapter_config)),
            }
        }
        "openai_compat" => {
            let base_url = non_empty(&llm.openai_compat.base_url)
                .context("llm.openai_compat.base_url must be set for provider openai_compat")?;
            let api_key = load_api_key(&llm.openai_compat.api_key_env, provider)?;
            Arc::new(OpenAiCompatInference::with_base_url(
                api_key,
                base_url,
                adapter_config,
            ))
        }
        "anthropic" => {
            let api_key = load_api_key(&llm.anthropic.api_key_env, provider)?;
            Arc::new(AnthropicInference::new(api_key, adapter_config))
        }
        "stub" => Arc::new(StubInference::heuristic()),
        other => bail!("Unknown LLM provider: {}", other),
    };

    Ok(inference)
}

pub(crate) fn scoring_config(config: &AppConfig) -> DomainScoringConfig {
    DomainScoringConfig {
        service_area: config.scoring.service_area.clone(),
        agency_description: config.scoring.agency_description.clone(),
        retry: RetryPolicy {
            max_retries: config.llm.retries,
            ..RetryPolicy::default()
        },
    }
}

fn adapter_llm_config(config: &LlmConfig) -> AdapterLlmConfig {
    AdapterLlmConfig {
        model: config.model.clone(),
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
        timeout_secs: config.timeout_secs,
    }
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn load_api_key(env_var: &str, provider: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No API key env var configured for provider {}", provider);
    }

    let key = std::env::var(env_var).with_context(|| {
        format!(
            "Missing API key env var {} for provider {}",
            env_var, provider
        )
    })?;

    if key.trim().is_empty() {
        bail!(
            "API key env var {} is empty for provider {}",
            env_var,
            provider
        );
    }

    Ok(SecretString::new(key.into()))
}

fn get_input_text(args: &ScoreArgs) -> Result<String> {
    if let Some(ref text) = args.text {
        return Ok(text.clone());
    }

    if let Some(ref path) = args.file {
        if path.as_os_str() != "-" {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path.display()));
        }
    }

    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read from stdin")?;
    Ok(text)
}
