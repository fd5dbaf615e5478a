//! Core Data Models
//!
//! This module defines the primary data structures shared by the comparison and
//! metrics services. These models represent the complete pipeline from a user's
//! prompt to the aggregated reports shown in the terminal.
//!
//! ## Data Flow
//!
//! 1. **Selection**: [`SelectedModel`] - A provider/model pair chosen for a run
//! 2. **Session**: [`ComparisonSession`] - Prompt plus selected models, later its results
//! 3. **Outcome**: [`ComparisonResult`] - One per model per run, never mutated afterwards
//! 4. **Summary**: [`ComparisonAnalysis`] - Derived on demand from a session's results
//! 5. **Log**: [`MetricRecord`] - One per provider call, appended to the metrics log
//! 6. **Reports**: [`AggregatedMetrics`] - Totals and breakdowns over a [`TimeRange`]
//!
//! ## Serialization
//!
//! Stored documents and JSON output use camelCase field names so that sessions
//! exported by older dashboard builds remain readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A third-party model vendor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
    Google,
    Mistral,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Mistral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Google => "Google",
            Provider::Mistral => "Mistral",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open-ai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "google" | "gemini" => Ok(Provider::Google),
            "mistral" => Ok(Provider::Mistral),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// A model picked for a comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedModel {
    pub model_id: String,
    pub provider: Provider,
    pub name: String,
}

impl SelectedModel {
    pub fn new(provider: Provider, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let name = crate::providers::catalog::display_name(provider, &model_id)
            .map(str::to_string)
            .unwrap_or_else(|| model_id.clone());
        Self {
            model_id,
            provider,
            name,
        }
    }

    /// Qualified form used on the command line and in legacy sessions.
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.provider, self.model_id)
    }
}

impl FromStr for SelectedModel {
    type Err = String;

    /// Parses `provider:model_id`, e.g. `openai:gpt-4o`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model_id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected 'provider:model', got '{}'", s))?;
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(format!("missing model id in '{}'", s));
        }
        Ok(SelectedModel::new(provider.parse()?, model_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub saved: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One comparison run: a prompt, the chosen models and, once executed, their results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSession {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub models: Vec<SelectedModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ComparisonResult>>,
    pub metadata: SessionMetadata,
}

impl ComparisonSession {
    pub fn new(prompt: impl Into<String>, system_prompt: Option<String>, models: Vec<SelectedModel>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
            models,
            results: None,
            metadata: SessionMetadata {
                created_at: Utc::now(),
                saved: false,
                tags: Vec::new(),
            },
        }
    }

    pub fn result_count(&self) -> usize {
        self.results.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetrics {
    /// Wall-clock milliseconds spent in the provider call.
    pub latency: u64,
    /// USD.
    pub cost: f64,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

impl ResultMetrics {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in as u64 + self.tokens_out as u64
    }
}

/// Outcome of calling a single model. Exactly one of `response` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub model_id: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: ResultMetrics,
    pub completed_at: DateTime<Utc>,
}

impl ComparisonResult {
    pub fn success(model: &SelectedModel, response: String, metrics: ResultMetrics) -> Self {
        Self {
            model_id: model.model_id.clone(),
            provider: model.provider,
            response: Some(response),
            error: None,
            metrics,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(model: &SelectedModel, error: impl Into<String>, latency: u64) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            model_id: model.model_id.clone(),
            provider: model.provider,
            response: None,
            error: Some(error),
            metrics: ResultMetrics {
                latency,
                ..Default::default()
            },
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Reference to a model inside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub model_id: String,
    pub provider: Provider,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastest: Option<ModelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheapest: Option<ModelRef>,
    pub average_latency: f64,
    pub total_cost: f64,
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub model_id: String,
    pub provider: Provider,
    pub score: f64,
    pub reason: String,
}

/// Summary of a completed run. Recomputed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonAnalysis {
    pub session_id: String,
    pub metrics: AnalysisMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

/// One provider call as written to the metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: Provider,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost: f64,
    pub latency: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl MetricRecord {
    pub fn from_result(result: &ComparisonResult, session_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: result.completed_at,
            provider: result.provider,
            model: result.model_id.clone(),
            tokens_in: result.metrics.tokens_in,
            tokens_out: result.metrics.tokens_out,
            cost: result.metrics.cost,
            latency: result.metrics.latency,
            success: result.is_success(),
            error: result.error.clone(),
            session_id: session_id.map(str::to_string),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens_in as u64 + self.tokens_out as u64
    }
}

/// Window over which metrics are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Today,
    Week,
    Month,
    Year,
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeRange::Today => "today",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAggregate {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_latency: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAggregate {
    pub provider: Provider,
    pub model: String,
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_latency: f64,
    pub p95_latency: u64,
    pub average_cost: f64,
    pub average_tokens: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub label: String,
    pub calls: u64,
    pub tokens: u64,
    pub cost: f64,
    pub average_latency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub range: TimeRange,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_latency: f64,
    pub by_provider: BTreeMap<Provider, ProviderAggregate>,
    /// Keyed by `provider:model`.
    pub by_model: BTreeMap<String, ModelAggregate>,
    pub time_series: Vec<TimeBucket>,
    pub hourly: Vec<TimeBucket>,
}

/// A named group of models that can be compared together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendedModel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub models: Vec<SelectedModel>,
    pub created_at: DateTime<Utc>,
}
