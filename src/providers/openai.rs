//! OpenAI-compatible chat completions.
//!
//! Mistral exposes the same `/chat/completions` and `/models` shapes, so one
//! client serves both vendors with a different base URL.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http_client::{check_status, default_http_client};
use super::{catalog, ChatRequest, ChatResponse, ModelInfo, ProviderClient, ProviderError, ProviderResult};
use crate::models::Provider;

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MISTRAL_API_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    id: String,
}

pub struct OpenAiCompatibleClient {
    provider: Provider,
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiCompatibleClient {
    pub fn new(
        provider: Provider,
        api_key: SecretString,
        base_url: Option<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let default_url = match provider {
            Provider::Mistral => DEFAULT_MISTRAL_API_URL,
            _ => DEFAULT_OPENAI_API_URL,
        };
        let base_url = base_url
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            provider,
            client: default_http_client(timeout)?,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatCompletionRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to send request to {}: {e}", self.provider)))?;

        let response: ChatCompletionResponse = check_status(response).await?.json().await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("response contained no choices".to_string()))?;
        let usage = response.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(ChatResponse {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost_usd: None,
        })
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelInfo>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        let models: ModelsResponse = check_status(response).await?.json().await?;

        let mut models: Vec<ModelInfo> = models
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: catalog::display_name(self.provider, &m.id)
                    .map(str::to_string)
                    .unwrap_or_else(|| m.id.clone()),
                id: m.id,
                provider: self.provider,
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }
}
