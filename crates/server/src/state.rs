//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use outreach_agent::{EngineConfig, EngineDeps, FollowUpScheduler};
use outreach_config::Settings;
use outreach_core::{LanguageModel, RecordStores};

use crate::session::{InMemorySessionRegistry, SessionRegistry};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Collaborators handed to each call's engine
    pub deps: EngineDeps,
    pub scheduler: FollowUpScheduler,
    pub registry: Arc<dyn SessionRegistry>,
    /// Prometheus render handle; `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State with an in-memory session registry sized from settings
    pub fn new(settings: Settings, llm: Arc<dyn LanguageModel>, stores: RecordStores) -> Self {
        let registry = Arc::new(
            InMemorySessionRegistry::from_config(&settings.server)
                .with_scheduler(FollowUpScheduler::new(stores.clone())),
        );
        Self::with_registry(settings, llm, stores, registry)
    }

    pub fn with_registry(
        settings: Settings,
        llm: Arc<dyn LanguageModel>,
        stores: RecordStores,
        registry: Arc<dyn SessionRegistry>,
    ) -> Self {
        let deps = EngineDeps {
            llm,
            stores: stores.clone(),
            prompts: Arc::new(settings.prompts.clone()),
            config: EngineConfig::from_settings(&settings),
        };
        Self {
            settings: Arc::new(settings),
            deps,
            scheduler: FollowUpScheduler::new(stores),
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Replace engine tunables (tests use immediate retries)
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.deps.config = config;
        self
    }
}
