//! Scoring engine - rubric prompt, inference call, score parsing

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::{
    model::{Post, ScoreResult},
    ports::{Inference, InferenceRequest, Scorer, ScoringError},
    retry::{RetryPolicy, retry},
};

/// Configuration for the scoring engine
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Geographic area the agency serves
    pub service_area: String,
    /// Who is scoring, and for what services
    pub agency_description: String,
    /// Retry policy for transient inference failures
    pub retry: RetryPolicy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            service_area: "New Haven County, Connecticut".to_string(),
            agency_description: "a home care agency that provides PCA (Personal Care Assistant) \
                                 and Homemaker Companion services"
                .to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

const SYSTEM_PROMPT: &str = "You score social media posts for home care lead quality. \
                             Output only valid JSON.";

/// Scores posts by asking an inference service to apply a fixed rubric
pub struct ScoringEngine<I: Inference + ?Sized> {
    inference: Arc<I>,
    config: ScoringConfig,
}

impl<I: Inference + ?Sized> ScoringEngine<I> {
    pub fn new(inference: Arc<I>, config: ScoringConfig) -> Self {
        Self { inference, config }
    }

    /// Build the inference request for a post
    pub fn build_request(&self, post: &Post) -> InferenceRequest {
        InferenceRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_scoring_prompt(&self.config, post),
        }
    }
}

#[async_trait]
impl<I: Inference + ?Sized> Scorer for ScoringEngine<I> {
    async fn score(&self, post: &Post) -> Result<ScoreResult, ScoringError> {
        let request = self.build_request(post);

        tracing::info!(post_id = %post.id, channel = %post.channel, "Scoring post");

        let raw = retry(&self.config.retry, "inference", || {
            self.inference.infer(&request)
        })
        .await?;

        let result = parse_score_response(&post.id, &raw).inspect_err(|e| {
            tracing::warn!(post_id = %post.id, error = %e, raw = %raw, "Unparseable score");
        })?;

        tracing::debug!(post_id = %post.id, score = result.score, "Scored post");

        Ok(result)
    }
}

/// Build the rubric prompt embedding the post
pub fn build_scoring_prompt(config: &ScoringConfig, post: &Post) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are a lead qualification assistant for {} in {}.\n\n",
        config.agency_description, config.service_area
    ));
    prompt.push_str(
        "Analyze the post below and decide how likely it represents a qualified, local lead.\n\n",
    );

    prompt.push_str("## Rubric\n");
    prompt.push_str("Score the post from 0 to 100 based on:\n");
    prompt.push_str(
        "1. Caregiving need: does the post describe a need for caregiving, senior support, \
         in-home assistance, or a family member who needs care?\n",
    );
    prompt.push_str(&format!(
        "2. Location relevance: does the post explicitly or implicitly relate to {} or nearby areas?\n",
        config.service_area
    ));
    prompt.push_str(
        "3. Expressed intent: is the author, or someone they know, actively looking for help \
         or open to services?\n",
    );
    prompt.push_str(
        "4. Actionability: is there enough detail that someone could reasonably follow up?\n\n",
    );
    prompt.push_str(
        "Do not score high for vague rants, general info-sharing, or non-local discussions.\n\n",
    );

    prompt.push_str("## Post\n");
    prompt.push_str(&format!("Channel: {}\n", post.channel));
    if !post.title.is_empty() && post.title != post.text {
        prompt.push_str(&format!("Title: {}\n", post.title));
    }
    prompt.push_str(&format!("Content: {}\n\n", post.text));

    prompt.push_str(
        r#"## Output Format
Respond with ONLY a JSON object in this format:
{
  "confidence_score": 0-100,
  "reason": "1-2 sentences explaining the score, including location and care relevance"
}
"#,
    );

    prompt
}

/// Parse an inference response into a score.
///
/// Accepts a JSON object (optionally fenced or wrapped in prose) with a
/// `confidence_score` or `score` key, or a bare number. Values outside
/// [0, 100] are rejected rather than clamped.
pub fn parse_score_response(post_id: &str, response: &str) -> Result<ScoreResult, ScoringError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ScoringError::Parse("Empty response".to_string()));
    }

    if let Some(json) = extract_json_object(trimmed) {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ScoringError::Parse(format!("Invalid JSON: {}", e)))?;

        let raw_score = value
            .get("confidence_score")
            .or_else(|| value.get("score"))
            .ok_or_else(|| ScoringError::Parse("Missing confidence_score".to_string()))?;

        let number = match raw_score {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ScoringError::Parse(format!("Unrepresentable score: {}", n)))?,
            Value::String(s) => parse_number(s)?,
            other => {
                return Err(ScoringError::Parse(format!(
                    "Score is not a number: {}",
                    other
                )));
            }
        };

        let rationale = value
            .get("reason")
            .or_else(|| value.get("rationale"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        return Ok(ScoreResult {
            post_id: post_id.to_string(),
            score: to_score(number)?,
            rationale,
        });
    }

    let number = parse_number(trimmed)?;
    Ok(ScoreResult {
        post_id: post_id.to_string(),
        score: to_score(number)?,
        rationale: String::new(),
    })
}

fn parse_number(text: &str) -> Result<f64, ScoringError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ScoringError::Parse(format!("Not a numeric score: {:?}", truncate(text, 80))))
}

fn to_score(value: f64) -> Result<u8, ScoringError> {
    if !value.is_finite() {
        return Err(ScoringError::Parse(format!("Score is not finite: {}", value)));
    }
    if !(0.0..=f64::from(ScoreResult::MAX_SCORE)).contains(&value) {
        return Err(ScoringError::Parse(format!(
            "Score {} outside 0-{}",
            value,
            ScoreResult::MAX_SCORE
        )));
    }
    Ok(value.round().clamp(0.0, f64::from(ScoreResult::MAX_SCORE)) as u8)
}

/// Extract a JSON object from a response (handles code fences and prose)
fn extract_json_object(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```") {
        let after = &response[start + 3..];
        if let Some(end) = after.find("```") {
            let block = after[..end].trim();
            let block = block.strip_prefix("json").unwrap_or(block).trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
