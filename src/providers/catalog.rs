//! Known models per provider, used when no API call is made.

use super::ModelInfo;
use crate::models::Provider;

const OPENAI_MODELS: &[(&str, &str)] = &[
    ("gpt-4o", "GPT-4o"),
    ("gpt-4o-mini", "GPT-4o mini"),
    ("gpt-4-turbo", "GPT-4 Turbo"),
    ("gpt-4", "GPT-4"),
    ("gpt-3.5-turbo", "GPT-3.5 Turbo"),
    ("o1-mini", "o1-mini"),
];

const ANTHROPIC_MODELS: &[(&str, &str)] = &[
    ("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet"),
    ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku"),
    ("claude-3-opus-20240229", "Claude 3 Opus"),
    ("claude-3-haiku-20240307", "Claude 3 Haiku"),
];

const GOOGLE_MODELS: &[(&str, &str)] = &[
    ("gemini-2.0-flash", "Gemini 2.0 Flash"),
    ("gemini-1.5-pro", "Gemini 1.5 Pro"),
    ("gemini-1.5-flash", "Gemini 1.5 Flash"),
];

const MISTRAL_MODELS: &[(&str, &str)] = &[
    ("mistral-large-latest", "Mistral Large"),
    ("mistral-small-latest", "Mistral Small"),
    ("open-mistral-nemo", "Mistral NeMo"),
];

fn entries(provider: Provider) -> &'static [(&'static str, &'static str)] {
    match provider {
        Provider::OpenAi => OPENAI_MODELS,
        Provider::Anthropic => ANTHROPIC_MODELS,
        Provider::Google => GOOGLE_MODELS,
        Provider::Mistral => MISTRAL_MODELS,
    }
}

pub fn default_models(provider: Provider) -> Vec<ModelInfo> {
    entries(provider)
        .iter()
        .map(|(id, name)| ModelInfo {
            id: id.to_string(),
            name: name.to_string(),
            provider,
        })
        .collect()
}

pub fn display_name(provider: Provider, model_id: &str) -> Option<&'static str> {
    entries(provider)
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, name)| *name)
}
