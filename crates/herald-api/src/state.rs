//! Application state shared across all route handlers.
//!
//! AppState holds references to the triage services and is passed to
//! handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use herald_core::config::HeraldConfig;
use herald_storage::ItemStore;
use herald_triage::{
    ActionExecutor, ContentSource, Normalizer, StateTransitionManager, TriageEngine,
};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only at runtime).
    pub config: Arc<HeraldConfig>,
    /// Item, author and audit persistence.
    pub store: Arc<dyn ItemStore>,
    /// Where fresh mentions and posts come from.
    pub source: Arc<dyn ContentSource>,
    pub normalizer: Arc<Normalizer>,
    pub engine: Arc<TriageEngine>,
    pub transitions: Arc<StateTransitionManager>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the triage services over one store.
    pub fn new(
        config: HeraldConfig,
        store: Arc<dyn ItemStore>,
        source: Arc<dyn ContentSource>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        let normalizer = Normalizer::new(Arc::clone(&store));
        let engine = TriageEngine::new(Arc::clone(&store), config.triage.clone());
        let transitions =
            StateTransitionManager::new(Arc::clone(&store), executor, config.actions.clone());
        Self {
            config: Arc::new(config),
            store,
            source,
            normalizer: Arc::new(normalizer),
            engine: Arc::new(engine),
            transitions: Arc::new(transitions),
            start_time: Instant::now(),
        }
    }
}
