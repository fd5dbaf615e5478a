//! Application context
//!
//! [`App`] is built once by `main` and owns every service. Services receive
//! their collaborators through their constructors; nothing is global.
//!
//! Key changes are propagated through the [`EventBus`]: the key watcher
//! rebuilds the [`ProviderRegistry`] whenever an `ApiKeysUpdated` event
//! arrives, so a comparison started afterwards sees the new keys.

use crate::blends::BlendStore;
use crate::comparison::{ComparisonOptions, ComparisonService};
use crate::config::{Config, ProvidersConfig};
use crate::display::DisplayManager;
use crate::events::{AppEvent, EventBus};
use crate::keys::ApiKeyStore;
use crate::metrics::MetricsService;
use crate::pricing::PricingCatalog;
use crate::providers::ProviderRegistry;
use crate::storage::JsonStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct App {
    pub config: Config,
    pub store: JsonStore,
    pub events: EventBus,
    pub keys: Arc<ApiKeyStore>,
    pub registry: Arc<ProviderRegistry>,
    pub pricing: Arc<PricingCatalog>,
    pub metrics: Arc<MetricsService>,
    pub comparison: ComparisonService,
    pub blends: BlendStore,
    pub display: DisplayManager,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store = JsonStore::open(&config.storage.data_dir, config.storage.max_value_kb)
            .with_context(|| format!("Failed to open data directory {}", config.storage.data_dir.display()))?;
        let events = EventBus::new();

        let keys = Arc::new(ApiKeyStore::new(store.clone(), events.clone()));
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .refresh_from_keys(&keys, &config.providers)
            .context("Failed to build provider clients")?;

        let pricing = Arc::new(PricingCatalog::load(&store));
        let metrics = Arc::new(MetricsService::new(
            store.clone(),
            events.clone(),
            config.metrics.retention_days,
        ));
        let comparison = ComparisonService::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Arc::clone(&pricing),
            store.clone(),
            events.clone(),
            ComparisonOptions::from(&config.comparison),
        );
        let blends = BlendStore::new(store.clone());
        let display = DisplayManager::new(config.output.json_pretty);

        debug!(data_dir = %store.root().display(), "Application context ready");

        Ok(Self {
            config,
            store,
            events,
            keys,
            registry,
            pricing,
            metrics,
            comparison,
            blends,
            display,
        })
    }

    /// Keeps the registry in step with the key store until the bus closes.
    pub fn start_key_watcher(&self) -> JoinHandle<()> {
        spawn_key_watcher(
            self.events.clone(),
            Arc::clone(&self.keys),
            Arc::clone(&self.registry),
            self.config.providers.clone(),
        )
    }
}

pub fn spawn_key_watcher(
    events: EventBus,
    keys: Arc<ApiKeyStore>,
    registry: Arc<ProviderRegistry>,
    providers: ProvidersConfig,
) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AppEvent::ApiKeysUpdated { provider }) => {
                    info!(provider = ?provider, "API keys changed, rebuilding provider clients");
                    if let Err(e) = registry.refresh_from_keys(&keys, &providers) {
                        warn!(error = %e, "Failed to rebuild provider clients");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Key watcher fell behind, rebuilding provider clients");
                    if let Err(e) = registry.refresh_from_keys(&keys, &providers) {
                        warn!(error = %e, "Failed to rebuild provider clients");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
