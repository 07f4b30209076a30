//! Anthropic Messages API adapter

use async_trait::async_trait;
use carelead_domain::{Inference, InferenceError, InferenceRequest};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{LlmConfig, check_status, http_client, send_error};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicInference {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl AnthropicInference {
    pub fn new(api_key: SecretString, config: LlmConfig) -> Self {
        Self::with_base_url(api_key, ANTHROPIC_BASE_URL.to_string(), config)
    }

    pub fn with_base_url(api_key: SecretString, base_url: String, config: LlmConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    r#type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Inference for AnthropicInference {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let body = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_output_tokens,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = check_status(response).await?;
        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidFormat(e.to_string()))?;

        let text = api_response
            .content
            .into_iter()
            .filter(|c| c.r#type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(InferenceError::InvalidFormat("Empty response".to_string()));
        }

        Ok(text)
    }
}
