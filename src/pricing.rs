//! Model pricing for cost calculations
//!
//! A built-in table covers the models in the provider catalog. `refresh`
//! pulls LiteLLM's public price sheet and caches the entries for supported
//! providers in the local store, where later runs pick them up.

use crate::models::Provider;
use crate::storage::{JsonStore, PRICING_KEY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const LITELLM_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

// Used when a model has no entry: $3 / $15 per million tokens.
const FALLBACK_INPUT_COST_PER_TOKEN: f64 = 0.000003;
const FALLBACK_OUTPUT_COST_PER_TOKEN: f64 = 0.000015;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub litellm_provider: Option<String>,
}

impl ModelPricing {
    fn per_million(input: f64, output: f64) -> Self {
        Self {
            input_cost_per_token: input / 1_000_000.0,
            output_cost_per_token: output / 1_000_000.0,
            max_input_tokens: None,
            litellm_provider: None,
        }
    }
}

/// Raw LiteLLM entry; most fields are optional in the sheet.
#[derive(Debug, Deserialize)]
struct LiteLlmEntry {
    input_cost_per_token: Option<f64>,
    output_cost_per_token: Option<f64>,
    max_input_tokens: Option<u32>,
    litellm_provider: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PricingCatalog {
    models: HashMap<String, ModelPricing>,
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingCatalog {
    pub fn builtin() -> Self {
        let table = [
            ("gpt-4o", 2.5, 10.0),
            ("gpt-4o-mini", 0.15, 0.6),
            ("gpt-4-turbo", 10.0, 30.0),
            ("gpt-4", 30.0, 60.0),
            ("gpt-3.5-turbo", 0.5, 1.5),
            ("o1-mini", 3.0, 12.0),
            ("claude-3-5-sonnet-20241022", 3.0, 15.0),
            ("claude-3-5-haiku-20241022", 0.8, 4.0),
            ("claude-3-opus-20240229", 15.0, 75.0),
            ("claude-3-haiku-20240307", 0.25, 1.25),
            ("gemini-1.5-pro", 1.25, 5.0),
            ("gemini-1.5-flash", 0.075, 0.3),
            ("gemini-2.0-flash", 0.1, 0.4),
            ("mistral-large-latest", 2.0, 6.0),
            ("mistral-small-latest", 0.2, 0.6),
            ("open-mistral-nemo", 0.15, 0.15),
        ];

        let models = table
            .into_iter()
            .map(|(name, input, output)| (name.to_string(), ModelPricing::per_million(input, output)))
            .collect();

        Self { models }
    }

    /// Built-in table overlaid with whatever `refresh` cached earlier.
    pub fn load(store: &JsonStore) -> Self {
        let mut catalog = Self::builtin();
        match store.get::<HashMap<String, ModelPricing>>(PRICING_KEY) {
            Ok(Some(cached)) => {
                debug!(models = cached.len(), "Loaded cached pricing");
                catalog.models.extend(cached);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable pricing cache"),
        }
        catalog
    }

    /// Fetch pricing data from LiteLLM and cache it. Returns the number of models cached.
    pub async fn refresh(&mut self, store: &JsonStore, client: &reqwest::Client) -> Result<usize> {
        info!("Fetching model pricing from LiteLLM");

        let response = client
            .get(LITELLM_PRICING_URL)
            .send()
            .await
            .context("Failed to fetch pricing data from LiteLLM")?
            .error_for_status()
            .context("LiteLLM pricing request failed")?;

        // Parse loosely: the sheet contains a `sample_spec` entry and rows that don't fit the shape
        let raw: HashMap<String, serde_json::Value> = response
            .json()
            .await
            .context("Failed to parse pricing data JSON")?;

        let fetched = Self::parse_litellm(raw);
        info!("Fetched pricing for {} models", fetched.len());

        store
            .set(PRICING_KEY, &fetched)
            .context("Failed to cache pricing data")?;

        let count = fetched.len();
        self.models.extend(fetched);
        Ok(count)
    }

    fn parse_litellm(raw: HashMap<String, serde_json::Value>) -> HashMap<String, ModelPricing> {
        raw.into_iter()
            .filter_map(|(name, value)| {
                let entry: LiteLlmEntry = serde_json::from_value(value).ok()?;
                if entry.mode.as_deref().is_some_and(|m| m != "chat") {
                    return None;
                }
                let provider = entry.litellm_provider.as_deref()?;
                let supported = matches!(
                    provider,
                    "openai" | "anthropic" | "gemini" | "vertex_ai-language-models" | "mistral"
                );
                if !supported {
                    return None;
                }
                Some((
                    name,
                    ModelPricing {
                        input_cost_per_token: entry.input_cost_per_token?,
                        output_cost_per_token: entry.output_cost_per_token?,
                        max_input_tokens: entry.max_input_tokens,
                        litellm_provider: entry.litellm_provider,
                    },
                ))
            })
            .collect()
    }

    /// Get pricing for a model by name
    pub fn get_pricing(&self, provider: Provider, model_name: &str) -> Option<&ModelPricing> {
        // Try exact match first
        if let Some(pricing) = self.models.get(model_name) {
            return Some(pricing);
        }

        // LiteLLM prefixes some vendors' models
        let prefixed = match provider {
            Provider::Google => format!("gemini/{}", model_name),
            Provider::Mistral => format!("mistral/{}", model_name),
            _ => model_name.to_string(),
        };
        if let Some(pricing) = self.models.get(&prefixed) {
            return Some(pricing);
        }

        // Dated snapshots share the price of their base model, e.g. gpt-4o-2024-08-06
        self.models
            .iter()
            .filter(|(name, _)| model_name.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, pricing)| pricing)
    }

    pub fn calculate_cost(&self, provider: Provider, model_name: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let (input_cost, output_cost) = match self.get_pricing(provider, model_name) {
            Some(p) => (p.input_cost_per_token, p.output_cost_per_token),
            None => {
                warn!(model = model_name, "No pricing found for model, using fallback pricing");
                (FALLBACK_INPUT_COST_PER_TOKEN, FALLBACK_OUTPUT_COST_PER_TOKEN)
            }
        };

        input_tokens as f64 * input_cost + output_tokens as f64 * output_cost
    }

    /// Sorted by model name.
    pub fn entries(&self) -> Vec<(&String, &ModelPricing)> {
        let mut entries: Vec<_> = self.models.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_cost() {
        let catalog = PricingCatalog::builtin();
        let cost = catalog.calculate_cost(Provider::OpenAi, "gpt-4o", 1_000_000, 1_000_000);
        assert!((cost - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_falls_back_to_base_model() {
        let catalog = PricingCatalog::builtin();
        let base = catalog.get_pricing(Provider::OpenAi, "gpt-4o-mini").unwrap();
        let dated = catalog.get_pricing(Provider::OpenAi, "gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(base, dated);
    }

    #[test]
    fn test_unknown_model_uses_fallback_rate() {
        let catalog = PricingCatalog::builtin();
        let cost = catalog.calculate_cost(Provider::Mistral, "unknown-model", 1000, 1000);
        assert!((cost - 0.018).abs() < 1e-9);
    }

    #[test]
    fn test_parse_litellm_filters_rows() {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(
            r#"{
                "sample_spec": {"max_tokens": "set to max"},
                "gpt-4o": {"input_cost_per_token": 2.5e-06, "output_cost_per_token": 1e-05, "litellm_provider": "openai", "mode": "chat"},
                "text-embedding-3-small": {"input_cost_per_token": 2e-08, "output_cost_per_token": 0.0, "litellm_provider": "openai", "mode": "embedding"},
                "command-r": {"input_cost_per_token": 5e-07, "output_cost_per_token": 1.5e-06, "litellm_provider": "cohere_chat", "mode": "chat"},
                "gemini/gemini-1.5-flash": {"input_cost_per_token": 7.5e-08, "output_cost_per_token": 3e-07, "litellm_provider": "gemini", "mode": "chat"}
            }"#,
        )
        .unwrap();

        let parsed = PricingCatalog::parse_litellm(raw);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains_key("gpt-4o"));
        assert!(parsed.contains_key("gemini/gemini-1.5-flash"));
    }

    #[test]
    fn test_load_overlays_cache() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path(), 64).unwrap();
        let mut cached = HashMap::new();
        cached.insert("my-model".to_string(), ModelPricing::per_million(1.0, 1.0));
        store.set(PRICING_KEY, &cached).unwrap();

        let catalog = PricingCatalog::load(&store);
        assert!(catalog.get_pricing(Provider::Mistral, "my-model").is_some());
        assert!(catalog.get_pricing(Provider::OpenAi, "gpt-4o").is_some());
    }
}
