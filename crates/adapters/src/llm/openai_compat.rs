//! OpenAI-compatible chat completions adapter (OpenAI, OpenRouter, local gateways)

use async_trait::async_trait;
use carelead_domain::{Inference, InferenceError, InferenceRequest};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{LlmConfig, check_status, http_client, send_error};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatInference {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl OpenAiCompatInference {
    pub fn new(api_key: SecretString, config: LlmConfig) -> Self {
        Self::with_base_url(api_key, OPENAI_BASE_URL.to_string(), config)
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
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Inference for OpenAiCompatInference {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = check_status(response).await?;
        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidFormat(e.to_string()))?;

        let text = api_response
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(InferenceError::InvalidFormat("Empty response".to_string()));
        }

        Ok(text)
    }
}
