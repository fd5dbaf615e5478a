//! Anthropic Messages API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http_client::{check_status, default_http_client};
use super::{ChatRequest, ChatResponse, ModelInfo, ProviderClient, ProviderError, ProviderResult};
use crate::models::Provider;

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, base_url: Option<String>, timeout: Duration) -> ProviderResult<Self> {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: default_http_client(timeout)?,
            base_url,
            api_key,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: request.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            // Anthropic caps temperature at 1.0
            temperature: request.temperature.map(|t| t.min(1.0)),
        };

        let response = self
            .request(self.client.post(format!("{}/messages", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to send request to Anthropic: {e}")))?;

        let response: MessagesResponse = check_status(response).await?.json().await?;

        let content: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            cost_usd: None,
        })
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelInfo>> {
        let response = self
            .request(self.client.get(format!("{}/models", self.base_url)))
            .send()
            .await?;

        let models: ModelsResponse = check_status(response).await?.json().await?;

        Ok(models
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.display_name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                provider: Provider::Anthropic,
            })
            .collect())
    }
}
