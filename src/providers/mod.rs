//! Provider clients
//!
//! Thin wrappers over each vendor's HTTP API behind the [`ProviderClient`]
//! trait. The comparison service only ever talks to the trait, which keeps
//! vendor quirks in this module and lets tests substitute scripted clients.
//!
//! - [`openai`] - OpenAI-compatible chat completions (OpenAI, Mistral)
//! - [`anthropic`] - Anthropic Messages API
//! - [`google`] - Gemini `generateContent`
//! - [`catalog`] - Known models per provider, used offline

pub mod anthropic;
pub mod catalog;
mod error;
pub mod google;
mod http_client;
pub mod openai;

pub use error::{ProviderError, ProviderResult};

use crate::config::ProvidersConfig;
use crate::keys::ApiKeyStore;
use crate::models::Provider;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Set when the vendor reports the charge itself.
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: Provider,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse>;

    async fn list_models(&self) -> ProviderResult<Vec<ModelInfo>>;

    /// Cheapest authenticated call the vendor offers.
    async fn test_connection(&self) -> ProviderResult<()> {
        self.list_models().await.map(|_| ())
    }
}

/// Builds the vendor client for `provider`.
pub fn build_client(
    provider: Provider,
    api_key: SecretString,
    config: &ProvidersConfig,
) -> ProviderResult<Arc<dyn ProviderClient>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client: Arc<dyn ProviderClient> = match provider {
        Provider::OpenAi => Arc::new(openai::OpenAiCompatibleClient::new(
            Provider::OpenAi,
            api_key,
            config.openai_base_url.clone(),
            timeout,
        )?),
        Provider::Mistral => Arc::new(openai::OpenAiCompatibleClient::new(
            Provider::Mistral,
            api_key,
            config.mistral_base_url.clone(),
            timeout,
        )?),
        Provider::Anthropic => Arc::new(anthropic::AnthropicClient::new(
            api_key,
            config.anthropic_base_url.clone(),
            timeout,
        )?),
        Provider::Google => Arc::new(google::GoogleClient::new(
            api_key,
            config.google_base_url.clone(),
            timeout,
        )?),
    };
    Ok(client)
}

/// Provider → client lookup shared by the services.
#[derive(Default)]
pub struct ProviderRegistry {
    clients: DashMap<Provider, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: Arc<dyn ProviderClient>) {
        let provider = client.provider();
        debug!(provider = %provider, "Registered provider client");
        self.clients.insert(provider, client);
    }

    pub fn get(&self, provider: Provider) -> ProviderResult<Arc<dyn ProviderClient>> {
        self.clients
            .get(&provider)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ProviderError::MissingApiKey(provider))
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.clients.iter().map(|e| *e.key()).collect();
        providers.sort();
        providers
    }

    /// Replaces every client with one built from the current keys.
    /// On error the registry is left as it was.
    pub fn refresh_from_keys(&self, keys: &ApiKeyStore, config: &ProvidersConfig) -> Result<()> {
        let clients = keys
            .all_keys()?
            .into_iter()
            .map(|(provider, key)| build_client(provider, key, config))
            .collect::<ProviderResult<Vec<_>>>()?;
        self.replace_all(clients);
        info!(providers = ?self.providers(), "Provider registry refreshed");
        Ok(())
    }

    /// Swaps in `clients` and drops providers not among them. Providers present
    /// before and after stay resolvable throughout.
    pub fn replace_all(&self, clients: Vec<Arc<dyn ProviderClient>>) {
        let keep: Vec<Provider> = clients.iter().map(|c| c.provider()).collect();
        for client in clients {
            self.register(client);
        }
        self.clients.retain(|provider, _| keep.contains(provider));
    }
}
