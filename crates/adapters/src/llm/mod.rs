//! Inference provider adapters
//!
//! Adapters only move text; prompt building and score parsing live in the
//! domain scoring engine.

pub mod anthropic;
pub mod openai_compat;
pub mod stub;

pub use anthropic::AnthropicInference;
pub use openai_compat::OpenAiCompatInference;
pub use stub::StubInference;

use carelead_domain::InferenceError;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Common LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Temperature (0.0-1.0)
    pub temperature: f64,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_output_tokens: 150,
            timeout_secs: 45,
        }
    }
}

fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build LLM HTTP client, using defaults");
            Client::new()
        })
}

fn send_error(e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Network(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(InferenceError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("API returned {}: {}", status, body);
    if status.is_server_error() {
        Err(InferenceError::Server(message))
    } else {
        Err(InferenceError::Api(message))
    }
}
