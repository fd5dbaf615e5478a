#![allow(dead_code)]

use async_trait::async_trait;
use modelviz::comparison::{ComparisonOptions, ComparisonService};
use modelviz::config::ScoreWeights;
use modelviz::events::EventBus;
use modelviz::metrics::MetricsService;
use modelviz::pricing::PricingCatalog;
use modelviz::providers::{
    ChatRequest, ChatResponse, ModelInfo, ProviderClient, ProviderError, ProviderRegistry, ProviderResult,
};
use modelviz::storage::JsonStore;
use modelviz::{MetricRecord, Provider};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone)]
enum Scripted {
    Respond {
        delay: Duration,
        content: String,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: Option<f64>,
    },
    Fail {
        delay: Duration,
        message: String,
    },
}

/// Provider client whose answers are scripted per model id.
pub struct MockClient {
    provider: Provider,
    script: HashMap<String, Scripted>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            script: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, model: &str, delay_ms: u64, content: &str, tokens: (u32, u32), cost_usd: Option<f64>) -> Self {
        self.script.insert(
            model.to_string(),
            Scripted::Respond {
                delay: Duration::from_millis(delay_ms),
                content: content.to_string(),
                input_tokens: tokens.0,
                output_tokens: tokens.1,
                cost_usd,
            },
        );
        self
    }

    pub fn fail(mut self, model: &str, delay_ms: u64, message: &str) -> Self {
        self.script.insert(
            model.to_string(),
            Scripted::Fail {
                delay: Duration::from_millis(delay_ms),
                message: message.to_string(),
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn chat_completion(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.get(&request.model).cloned() {
            Some(Scripted::Respond {
                delay,
                content,
                input_tokens,
                output_tokens,
                cost_usd,
            }) => {
                tokio::time::sleep(delay).await;
                Ok(ChatResponse {
                    content,
                    input_tokens,
                    output_tokens,
                    cost_usd,
                })
            }
            Some(Scripted::Fail { delay, message }) => {
                tokio::time::sleep(delay).await;
                Err(ProviderError::Other(message))
            }
            None => Err(ProviderError::ModelNotFound(request.model.clone())),
        }
    }

    async fn list_models(&self) -> ProviderResult<Vec<ModelInfo>> {
        Ok(self
            .script
            .keys()
            .map(|id| ModelInfo {
                id: id.clone(),
                name: id.clone(),
                provider: self.provider,
            })
            .collect())
    }
}

/// Comparison service over a temporary data directory.
pub struct Harness {
    pub dir: TempDir,
    pub store: JsonStore,
    pub events: EventBus,
    pub registry: Arc<ProviderRegistry>,
    pub metrics: Arc<MetricsService>,
    pub service: ComparisonService,
}

pub fn harness(timeout: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(dir.path(), 1024).unwrap();
    let events = EventBus::new();
    let registry = Arc::new(ProviderRegistry::new());
    let metrics = Arc::new(MetricsService::new(store.clone(), events.clone(), 90));
    let options = ComparisonOptions {
        timeout,
        max_tokens: 256,
        temperature: Some(0.2),
        weights: ScoreWeights::default(),
    };
    let service = ComparisonService::new(
        Arc::clone(&registry),
        Arc::clone(&metrics),
        Arc::new(PricingCatalog::builtin()),
        store.clone(),
        events.clone(),
        options,
    );

    Harness {
        dir,
        store,
        events,
        registry,
        metrics,
        service,
    }
}

pub fn record(
    provider: Provider,
    model: &str,
    timestamp: DateTime<Utc>,
    tokens: (u32, u32),
    cost: f64,
    latency: u64,
    success: bool,
) -> MetricRecord {
    MetricRecord {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp,
        provider,
        model: model.to_string(),
        tokens_in: tokens.0,
        tokens_out: tokens.1,
        cost,
        latency,
        success,
        error: (!success).then(|| "failed".to_string()),
        session_id: None,
    }
}
