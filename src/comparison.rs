//! Comparison Engine
//!
//! Runs one prompt against several models and summarizes the outcome.
//!
//! ## Execution
//!
//! [`ComparisonService::execute_comparison`] issues one call per selected model,
//! all concurrently, under a single deadline shared by the whole run. Calls are
//! independent: a missing API key, a vendor error or the deadline firing turns
//! into a [`ComparisonResult`] with `error` set, and never affects the other
//! models. Results come back in the order the models were selected. Every call
//! is written to the metrics log afterwards.
//!
//! ## Analysis
//!
//! [`analyze_results`] is pure. Only successful results compete for fastest,
//! cheapest and the "best overall" recommendation; when every call failed all
//! three are absent. The recommendation is the highest weighted score of
//!
//! - speed: `fastest_latency / latency`
//! - cost: `cheapest_cost / cost`
//! - output: `tokens_out / most_tokens_out`
//!
//! using [`ScoreWeights`]. Ties go to the earlier model.
//!
//! ## Persistence
//!
//! Sessions live in one JSON array under [`SESSIONS_KEY`]. Entries written by
//! older builds are upgraded in place the first time they are read.

use crate::config::{ComparisonConfig, ScoreWeights};
use crate::events::{AppEvent, EventBus};
use crate::export::{self, ExportFormat};
use crate::metrics::MetricsService;
use crate::models::*;
use crate::pricing::PricingCatalog;
use crate::providers::{ChatRequest, ProviderError, ProviderRegistry};
use crate::storage::{JsonStore, SESSIONS_KEY};
use crate::timestamp_parser::TimestampParser;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Deadline used when `timeout` cannot be added to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone)]
pub struct ComparisonOptions {
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub weights: ScoreWeights,
}

impl From<&ComparisonConfig> for ComparisonOptions {
    fn from(config: &ComparisonConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            weights: config.weights,
        }
    }
}

pub struct ComparisonService {
    registry: Arc<ProviderRegistry>,
    metrics: Arc<MetricsService>,
    pricing: Arc<PricingCatalog>,
    store: JsonStore,
    events: EventBus,
    options: ComparisonOptions,
}

impl ComparisonService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        metrics: Arc<MetricsService>,
        pricing: Arc<PricingCatalog>,
        store: JsonStore,
        events: EventBus,
        options: ComparisonOptions,
    ) -> Self {
        Self {
            registry,
            metrics,
            pricing,
            store,
            events,
            options,
        }
    }

    pub fn options(&self) -> &ComparisonOptions {
        &self.options
    }

    /// One result per model in `session.models`, in the same order.
    #[instrument(skip_all, fields(session_id = %session.id, models = session.models.len()))]
    pub async fn execute_comparison(&self, session: &ComparisonSession) -> Vec<ComparisonResult> {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.options.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);

        let calls = session
            .models
            .iter()
            .map(|model| self.call_model(session, model, deadline));
        let results = join_all(calls).await;

        let records = results
            .iter()
            .map(|r| MetricRecord::from_result(r, Some(session.id.as_str())))
            .collect();
        if let Err(e) = self.metrics.record_calls(records, Utc::now()).await {
            warn!(error = %e, "Failed to record comparison metrics");
        }

        let failures = results.iter().filter(|r| !r.is_success()).count();
        info!(
            succeeded = results.len() - failures,
            failed = failures,
            "Comparison finished"
        );

        results
    }

    async fn call_model(&self, session: &ComparisonSession, model: &SelectedModel, deadline: Instant) -> ComparisonResult {
        let client = match self.registry.get(model.provider) {
            Ok(client) => client,
            Err(e) => {
                warn!(model = %model.qualified_id(), error = %e, "Skipping model");
                return ComparisonResult::failure(model, e.to_string(), 0);
            }
        };

        let request = ChatRequest {
            model: model.model_id.clone(),
            system_prompt: session.system_prompt.clone(),
            prompt: session.prompt.clone(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout_at(deadline, client.chat_completion(&request)).await;
        let latency = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) => {
                let cost = response.cost_usd.unwrap_or_else(|| {
                    self.pricing.calculate_cost(
                        model.provider,
                        &model.model_id,
                        response.input_tokens,
                        response.output_tokens,
                    )
                });
                debug!(model = %model.qualified_id(), latency_ms = latency, cost = cost, "Model call succeeded");
                ComparisonResult::success(
                    model,
                    response.content,
                    ResultMetrics {
                        latency,
                        cost,
                        tokens_in: response.input_tokens,
                        tokens_out: response.output_tokens,
                    },
                )
            }
            Ok(Err(e)) => {
                warn!(model = %model.qualified_id(), latency_ms = latency, error = %e, "Model call failed");
                ComparisonResult::failure(model, e.to_string(), latency)
            }
            Err(_) => {
                let e = ProviderError::Timeout(self.options.timeout);
                warn!(model = %model.qualified_id(), error = %e, "Model call timed out");
                ComparisonResult::failure(model, e.to_string(), latency)
            }
        }
    }

    pub fn analyze_results(&self, session_id: &str, results: &[ComparisonResult]) -> ComparisonAnalysis {
        analyze_results(session_id, results, &self.options.weights)
    }

    /// Executes, attaches results, analyzes and optionally saves.
    pub async fn run_comparison(
        &self,
        mut session: ComparisonSession,
        save: bool,
    ) -> Result<(ComparisonSession, ComparisonAnalysis)> {
        if session.prompt.trim().is_empty() {
            anyhow::bail!("Prompt cannot be empty");
        }
        if session.models.is_empty() {
            anyhow::bail!("Select at least one model to compare");
        }

        let results = self.execute_comparison(&session).await;
        let analysis = self.analyze_results(&session.id, &results);
        session.results = Some(results);

        if save {
            self.save_session(&mut session)?;
        }

        Ok((session, analysis))
    }

    pub fn export_results(
        &self,
        session: &ComparisonSession,
        analysis: &ComparisonAnalysis,
        format: ExportFormat,
    ) -> Result<String> {
        export::render(session, analysis, format)
    }

    /// All stored sessions in insertion order, upgrading legacy entries once.
    pub fn get_all_sessions(&self) -> Result<Vec<ComparisonSession>> {
        Ok(self
            .load_entries()?
            .into_iter()
            .filter_map(|entry| match entry {
                StoredSession::Readable(session) => Some(session),
                StoredSession::Unreadable(_) => None,
            })
            .collect())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<ComparisonSession>> {
        Ok(self.get_all_sessions()?.into_iter().find(|s| s.id == id))
    }

    /// Marks the session saved and stores it. A session that was already saved cannot be overwritten.
    pub fn save_session(&self, session: &mut ComparisonSession) -> Result<()> {
        let mut entries = self.load_entries()?;

        if let Some(existing) = entries.iter().find_map(|e| e.session().filter(|s| s.id == session.id)) {
            if existing.metadata.saved {
                anyhow::bail!("Session {} is already saved and cannot be modified", session.id);
            }
        }

        session.metadata.saved = true;
        let slot = entries
            .iter_mut()
            .find(|e| e.session().is_some_and(|s| s.id == session.id));
        match slot {
            Some(slot) => *slot = StoredSession::Readable(session.clone()),
            None => entries.push(StoredSession::Readable(session.clone())),
        }
        self.write_entries(&entries)?;

        info!(session_id = %session.id, "Session saved");
        self.events.publish(AppEvent::SessionSaved {
            session_id: session.id.clone(),
        });
        Ok(())
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let mut entries = self.load_entries()?;
        let before = entries.len();
        entries.retain(|e| e.session().map_or(true, |s| s.id != id));
        if entries.len() == before {
            return Ok(false);
        }

        self.write_entries(&entries)?;
        self.events.publish(AppEvent::SessionDeleted {
            session_id: id.to_string(),
        });
        Ok(true)
    }

    /// Every stored entry in order. Entries that cannot be read are kept as raw JSON
    /// so that later writes put them back untouched.
    fn load_entries(&self) -> Result<Vec<StoredSession>> {
        let raw: Vec<serde_json::Value> = self
            .store
            .get_or_default(SESSIONS_KEY)
            .context("Failed to read saved sessions")?;

        let mut upgraded = 0;
        let mut entries = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<ComparisonSession>(value.clone()) {
                Ok(session) => entries.push(StoredSession::Readable(session)),
                Err(_) => match upgrade_legacy_session(value.clone()) {
                    Ok(session) => {
                        upgraded += 1;
                        entries.push(StoredSession::Readable(session));
                    }
                    Err(e) => {
                        let id = value.get("id").and_then(|id| id.as_str()).unwrap_or("<unknown>");
                        warn!(session_id = id, error = %e, "Skipping unreadable stored session");
                        entries.push(StoredSession::Unreadable(value));
                    }
                },
            }
        }

        if upgraded > 0 {
            info!(upgraded = upgraded, "Upgraded sessions stored by an older version");
            self.write_entries(&entries)?;
        }

        Ok(entries)
    }

    fn write_entries(&self, entries: &[StoredSession]) -> Result<()> {
        self.store
            .set(SESSIONS_KEY, entries)
            .context("Failed to write saved sessions")
    }
}

/// One element of the stored session array.
#[derive(Serialize)]
#[serde(untagged)]
enum StoredSession {
    Readable(ComparisonSession),
    Unreadable(serde_json::Value),
}

impl StoredSession {
    fn session(&self) -> Option<&ComparisonSession> {
        match self {
            StoredSession::Readable(session) => Some(session),
            StoredSession::Unreadable(_) => None,
        }
    }
}

/// fastest/cheapest value ratio, 1.0 for the winner.
fn relative(best: f64, value: f64) -> f64 {
    if value <= 0.0 || value <= best {
        1.0
    } else {
        best / value
    }
}

/// First element with the smallest key; NaN never wins.
fn min_by_metric<'a>(results: &[&'a ComparisonResult], key: impl Fn(&ComparisonResult) -> f64) -> Option<&'a ComparisonResult> {
    let mut best: Option<&'a ComparisonResult> = None;
    for &result in results {
        let value = key(result);
        if value.is_nan() {
            continue;
        }
        if best.map_or(true, |b| value < key(b)) {
            best = Some(result);
        }
    }
    best
}

fn model_ref(result: &ComparisonResult, value: f64) -> ModelRef {
    ModelRef {
        model_id: result.model_id.clone(),
        provider: result.provider,
        value,
    }
}

pub fn analyze_results(session_id: &str, results: &[ComparisonResult], weights: &ScoreWeights) -> ComparisonAnalysis {
    let successful: Vec<&ComparisonResult> = results.iter().filter(|r| r.is_success()).collect();

    let fastest = min_by_metric(&successful, |r| r.metrics.latency as f64);
    let cheapest = min_by_metric(&successful, |r| r.metrics.cost);

    let average_latency = if successful.is_empty() {
        0.0
    } else {
        successful.iter().map(|r| r.metrics.latency as f64).sum::<f64>() / successful.len() as f64
    };

    let recommendation = match (fastest, cheapest) {
        (Some(fastest), Some(cheapest)) => {
            let best_latency = fastest.metrics.latency as f64;
            let best_cost = cheapest.metrics.cost;
            let most_output = successful.iter().map(|r| r.metrics.tokens_out).max().unwrap_or(0);
            let weight_sum = weights.speed + weights.cost + weights.output;

            let mut best: Option<(&ComparisonResult, f64, [f64; 3])> = None;
            for &result in &successful {
                let speed = relative(best_latency, result.metrics.latency as f64);
                let cost = relative(best_cost, result.metrics.cost);
                let output = if most_output == 0 {
                    1.0
                } else {
                    result.metrics.tokens_out as f64 / most_output as f64
                };
                let score = (weights.speed * speed + weights.cost * cost + weights.output * output) / weight_sum;
                if best.map_or(true, |(_, s, _)| score > s) {
                    best = Some((result, score, [speed, cost, output]));
                }
            }

            best.map(|(result, score, [speed, cost, output])| Recommendation {
                model_id: result.model_id.clone(),
                provider: result.provider,
                score,
                reason: format!(
                    "Highest weighted score: speed {:.2}, cost {:.2}, output {:.2}",
                    speed, cost, output
                ),
            })
        }
        _ => None,
    };

    ComparisonAnalysis {
        session_id: session_id.to_string(),
        metrics: AnalysisMetrics {
            fastest: fastest.map(|r| model_ref(r, r.metrics.latency as f64)),
            cheapest: cheapest.map(|r| model_ref(r, r.metrics.cost)),
            average_latency,
            total_cost: results.iter().map(|r| r.metrics.cost).sum(),
            success_count: successful.len(),
            failure_count: results.len() - successful.len(),
        },
        recommendation,
        generated_at: Utc::now(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyModel {
    Qualified(String),
    Full(SelectedModel),
}

/// Session shape written before metadata existed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySession {
    id: String,
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    models: Vec<LegacyModel>,
    #[serde(default)]
    results: Option<Vec<ComparisonResult>>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    saved: Option<bool>,
}

fn upgrade_legacy_session(value: serde_json::Value) -> Result<ComparisonSession> {
    let legacy: LegacySession = serde_json::from_value(value).context("Unrecognized session shape")?;

    let models = legacy
        .models
        .into_iter()
        .map(|m| match m {
            LegacyModel::Full(model) => Ok(model),
            LegacyModel::Qualified(s) => s.parse::<SelectedModel>().map_err(anyhow::Error::msg),
        })
        .collect::<Result<Vec<_>>>()?;

    let created_at = match legacy.timestamp.as_ref() {
        Some(ts) => TimestampParser::from_json(ts)?,
        None => DateTime::<Utc>::UNIX_EPOCH,
    };

    Ok(ComparisonSession {
        id: legacy.id,
        prompt: legacy.prompt,
        system_prompt: legacy.system_prompt,
        models,
        results: legacy.results,
        metadata: SessionMetadata {
            created_at,
            saved: legacy.saved.unwrap_or(true),
            tags: Vec::new(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(model_id: &str, latency: u64, cost: f64, tokens_out: u32, error: Option<&str>) -> ComparisonResult {
        let model = SelectedModel::new(Provider::OpenAi, model_id);
        match error {
            Some(e) => ComparisonResult::failure(&model, e, latency),
            None => ComparisonResult::success(
                &model,
                "ok".to_string(),
                ResultMetrics {
                    latency,
                    cost,
                    tokens_in: 10,
                    tokens_out,
                },
            ),
        }
    }

    #[test]
    fn test_fastest_and_cheapest_ignore_failures() {
        let results = vec![
            result("failed-fast", 1, 0.0, 0, Some("boom")),
            result("slow-cheap", 500, 0.001, 100, None),
            result("fast-pricey", 100, 0.01, 100, None),
        ];

        let analysis = analyze_results("s1", &results, &ScoreWeights::default());
        assert_eq!(analysis.metrics.fastest.unwrap().model_id, "fast-pricey");
        assert_eq!(analysis.metrics.cheapest.unwrap().model_id, "slow-cheap");
        assert_eq!(analysis.metrics.success_count, 2);
        assert_eq!(analysis.metrics.failure_count, 1);
        assert_eq!(analysis.metrics.average_latency, 300.0);
    }

    #[test]
    fn test_all_failed_has_no_winners() {
        let results = vec![
            result("a", 10, 0.0, 0, Some("rate limited")),
            result("b", 20, 0.0, 0, Some("unauthorized")),
        ];

        let analysis = analyze_results("s1", &results, &ScoreWeights::default());
        assert!(analysis.metrics.fastest.is_none());
        assert!(analysis.metrics.cheapest.is_none());
        assert!(analysis.recommendation.is_none());
        assert_eq!(analysis.metrics.average_latency, 0.0);
    }

    #[test]
    fn test_empty_results() {
        let analysis = analyze_results("s1", &[], &ScoreWeights::default());
        assert!(analysis.metrics.fastest.is_none());
        assert_eq!(analysis.metrics.success_count, 0);
    }

    #[test]
    fn test_recommendation_follows_weights() {
        let results = vec![
            result("fast", 100, 0.010, 100, None),
            result("cheap", 400, 0.001, 100, None),
        ];

        let speed_only = ScoreWeights {
            speed: 1.0,
            cost: 0.0,
            output: 0.0,
        };
        let cost_only = ScoreWeights {
            speed: 0.0,
            cost: 1.0,
            output: 0.0,
        };

        let by_speed = analyze_results("s", &results, &speed_only).recommendation.unwrap();
        assert_eq!(by_speed.model_id, "fast");
        assert!((by_speed.score - 1.0).abs() < 1e-9);

        let by_cost = analyze_results("s", &results, &cost_only).recommendation.unwrap();
        assert_eq!(by_cost.model_id, "cheap");
    }

    #[test]
    fn test_ties_go_to_earlier_result() {
        let results = vec![result("first", 100, 0.01, 50, None), result("second", 100, 0.01, 50, None)];
        let analysis = analyze_results("s", &results, &ScoreWeights::default());
        assert_eq!(analysis.metrics.fastest.unwrap().model_id, "first");
        assert_eq!(analysis.metrics.cheapest.unwrap().model_id, "first");
        assert_eq!(analysis.recommendation.unwrap().model_id, "first");
    }

    #[test]
    fn test_upgrade_legacy_session() {
        let legacy = serde_json::json!({
            "id": "legacy-1",
            "prompt": "Hello",
            "models": ["openai:gpt-4", "anthropic:claude-3-haiku-20240307"],
            "timestamp": 1704110400000i64
        });

        let session = upgrade_legacy_session(legacy).unwrap();
        assert_eq!(session.models.len(), 2);
        assert_eq!(session.models[1].provider, Provider::Anthropic);
        assert_eq!(session.metadata.created_at.to_rfc3339(), "2024-01-01T12:00:00+00:00");
        assert!(session.metadata.saved);
    }

    #[test]
    fn test_upgrade_rejects_unknown_shape() {
        assert!(upgrade_legacy_session(serde_json::json!({"foo": "bar"})).is_err());
        assert!(upgrade_legacy_session(serde_json::json!({
            "id": "x", "prompt": "p", "models": ["nonsense"]
        }))
        .is_err());
    }
}
