//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use kb_core::config::KbConfig;
use kb_service::{ImportService, KnowledgeBaseService};
use kb_vector::{VectorEngine, VectorStore};

use crate::auth::TokenRegistry;

/// Shared application state, passed to handlers via axum's `State`.
///
/// Every field is behind an `Arc`, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<KbConfig>,
    pub kb: Arc<KnowledgeBaseService>,
    pub importer: Arc<ImportService>,
    pub tokens: Arc<TokenRegistry>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services on top of `engine` according to `config`.
    pub fn new(config: KbConfig, engine: Arc<dyn VectorEngine>) -> Self {
        let store = Arc::new(VectorStore::new(engine, config.engine.embedding_dim));
        let kb = Arc::new(KnowledgeBaseService::new(store, config.search.clone()));
        let importer = Arc::new(ImportService::new(Arc::clone(&kb), &config.import));
        let tokens = Arc::new(TokenRegistry::from_entries(&config.auth.tokens));
        Self {
            config: Arc::new(config),
            kb,
            importer,
            tokens,
            start_time: Instant::now(),
        }
    }
}
