//! Vector engine client with a local document cache.
//!
//! `VectorStore` is the single seam between the knowledge base and the
//! engine's wire format. Writes propagate failures; reads degrade to cached
//! or empty results so that an unavailable engine never breaks browsing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use kb_core::error::Result;
use kb_core::types::{Document, SearchResult};

use crate::cache::DocumentCache;
use crate::engine::{BatchAck, EngineDocument, EngineHit, IndexDocument, VectorEngine};

/// Client for the external vector engine.
///
/// Cheap to share behind an `Arc`; the cache is internally synchronized.
pub struct VectorStore {
    engine: Arc<dyn VectorEngine>,
    cache: DocumentCache,
    embedding_dim: usize,
}

impl VectorStore {
    /// Create a store over `engine`, reporting `embedding_dim` in stats.
    pub fn new(engine: Arc<dyn VectorEngine>, embedding_dim: usize) -> Self {
        Self {
            engine,
            cache: DocumentCache::new(),
            embedding_dim,
        }
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    /// Index one document, caching it once the engine accepts it.
    pub async fn add_document(&self, doc: &Document) -> Result<()> {
        if let Err(e) = self.engine.add(&IndexDocument::from(doc)).await {
            error!(id = %doc.id, error = %e, "Failed to add document to engine");
            return Err(e);
        }
        self.cache.insert(doc.clone())?;
        debug!(id = %doc.id, "Document indexed");
        Ok(())
    }

    /// Index documents in one request. Any failure rejects the whole batch.
    pub async fn add_documents(&self, docs: &[Document]) -> Result<BatchAck> {
        if docs.is_empty() {
            return Ok(BatchAck::default());
        }

        let payload: Vec<IndexDocument> = docs.iter().map(IndexDocument::from).collect();
        let ack = match self.engine.add_batch(&payload).await {
            Ok(ack) => ack,
            Err(e) => {
                error!(count = docs.len(), error = %e, "Failed to add document batch to engine");
                return Err(e);
            }
        };

        self.cache.insert_many(docs.iter().cloned())?;
        info!(
            added = ack.added,
            total_documents = ack.total_documents,
            "Document batch indexed"
        );
        Ok(ack)
    }

    /// Remove a document from the engine and the cache.
    ///
    /// Never fails: engine errors are logged and the cache entry is evicted
    /// regardless.
    pub async fn remove_document(&self, id: &str) {
        if let Err(e) = self.engine.remove(id).await {
            warn!(id, error = %e, "Failed to remove document from engine");
        }
        if let Err(e) = self.cache.remove(id) {
            warn!(id, error = %e, "Failed to evict document from cache");
        }
    }

    /// Semantic search returning up to `top_k` results, closest first.
    ///
    /// Fails open: any engine error yields an empty result list.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        self.search_page(query, top_k).await.0
    }

    /// Like [`search`](Self::search), also returning how many hits the engine
    /// sent before unresolvable ones were dropped.
    pub async fn search_page(&self, query: &str, top_k: usize) -> (Vec<SearchResult>, usize) {
        if top_k == 0 {
            return (Vec::new(), 0);
        }

        let hits = match self.engine.search(query, top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Search failed, returning no results");
                return (Vec::new(), 0);
            }
        };

        let raw = hits.len();
        let results = hits
            .into_iter()
            .filter_map(|hit| {
                let distance = hit.score;
                self.resolve_hit(hit)
                    .map(|doc| SearchResult::from_distance(doc, distance))
            })
            .collect();
        (results, raw)
    }

    /// Prefer the cached document; otherwise rebuild it from hit metadata.
    fn resolve_hit(&self, hit: EngineHit) -> Option<Document> {
        match self.cache.get(&hit.id) {
            Ok(Some(doc)) => return Some(doc),
            Ok(None) => {}
            Err(e) => warn!(id = %hit.id, error = %e, "Cache lookup failed"),
        }

        let Some(meta) = hit.metadata else {
            debug!(id = %hit.id, "Dropping hit with no cached document and no metadata");
            return None;
        };
        let created_at = meta
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(Document::new(
            hit.id,
            meta.title.unwrap_or_else(|| "Untitled".to_string()),
            meta.content.unwrap_or_default(),
            meta.category.as_deref(),
            created_at,
            meta.created_by,
        ))
    }

    /// Cached document by id.
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.cache.get(id)
    }

    /// Every document known to the engine, falling back to the cache.
    ///
    /// A successful enumeration is merged into the cache: listed documents
    /// are upserted and entries cached before the request but no longer
    /// listed are evicted. Entries added while the request was in flight
    /// are left alone.
    pub async fn all_documents(&self) -> Result<Vec<Document>> {
        let known: HashSet<String> = self.cache.values()?.into_iter().map(|d| d.id).collect();
        match self.engine.documents().await {
            Ok(listed) => {
                let docs = self.merge_listing(listed)?;
                let listed_ids: HashSet<&str> = docs.iter().map(|d| d.id.as_str()).collect();
                for stale in known.iter().filter(|id| !listed_ids.contains(id.as_str())) {
                    self.cache.remove(stale)?;
                }
                self.cache.insert_many(docs.iter().cloned())?;
                Ok(docs)
            }
            Err(e) => {
                warn!(error = %e, "Engine enumeration failed, serving cached documents");
                self.cache.values()
            }
        }
    }

    /// Convert an engine listing to documents.
    ///
    /// For ids already cached, the cached timestamp and creator win: the
    /// listing carries no timestamp and reports a missing creator as "System".
    fn merge_listing(&self, listed: Vec<EngineDocument>) -> Result<Vec<Document>> {
        listed
            .into_iter()
            .map(|d| {
                let (created_at, created_by) = match self.cache.get(&d.id)? {
                    Some(cached) => (cached.created_at, cached.created_by),
                    None => (Utc::now(), d.created_by),
                };
                Ok(Document::new(
                    d.id,
                    d.title.unwrap_or_else(|| "Untitled".to_string()),
                    d.content.unwrap_or_default(),
                    d.category.as_deref(),
                    created_at,
                    created_by,
                ))
            })
            .collect()
    }

    /// Re-populate the cache from the engine. Returns the number of documents.
    pub async fn reload(&self) -> Result<usize> {
        let listed = self.engine.documents().await?;
        let docs = self.merge_listing(listed)?;
        let count = docs.len();
        self.cache.replace_all(docs)?;
        info!(count, "Document cache reloaded from engine");
        Ok(count)
    }

    /// Number of indexed documents, falling back to the cache size.
    pub async fn document_count(&self) -> u64 {
        match self.engine.stats().await {
            Ok(stats) => stats.total_documents,
            Err(e) => {
                debug!(error = %e, "Engine stats unavailable, using cache size");
                self.cache.len() as u64
            }
        }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dim
    }

    /// Raw engine statistics, or `{"error": ...}` when unavailable.
    pub async fn stats(&self) -> serde_json::Value {
        match self.engine.stats().await {
            Ok(stats) => serde_json::to_value(stats)
                .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        }
    }

    /// Remove every document from the engine, then empty the cache.
    pub async fn clear(&self) -> Result<()> {
        if let Err(e) = self.engine.clear().await {
            error!(error = %e, "Failed to clear engine index");
            return Err(e);
        }
        self.cache.clear()?;
        info!("Engine index cleared");
        Ok(())
    }

    pub async fn is_engine_healthy(&self) -> bool {
        self.engine.health().await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEngine;
    use kb_core::KbError;

    fn store() -> (Arc<InMemoryEngine>, VectorStore) {
        let engine = Arc::new(InMemoryEngine::new(128));
        let store = VectorStore::new(engine.clone(), 384);
        (engine, store)
    }

    #[tokio::test]
    async fn test_add_caches_document() {
        let (_engine, store) = store();
        let doc = Document::create("Rust", "ownership", Some("Tech"), None);
        store.add_document(&doc).await.unwrap();
        assert_eq!(store.get_document(&doc.id).unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_failed_add_propagates_and_skips_cache() {
        let (engine, store) = store();
        engine.fail_next_writes(1);
        let doc = Document::create("Rust", "ownership", None, None);
        let err = store.add_document(&doc).await.unwrap_err();
        assert!(matches!(err, KbError::Engine(_)));
        assert_eq!(store.get_document(&doc.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_batch_caches_nothing() {
        let (engine, store) = store();
        engine.fail_next_writes(1);
        let docs = vec![
            Document::create("a", "x", None, None),
            Document::create("b", "y", None, None),
        ];
        assert!(store.add_documents(&docs).await.is_err());
        assert!(store.cache().is_empty());
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (engine, store) = store();
        engine.set_unavailable(true);
        let ack = store.add_documents(&[]).await.unwrap();
        assert_eq!(ack.added, 0);
    }

    #[tokio::test]
    async fn test_remove_swallows_engine_errors() {
        let (engine, store) = store();
        let doc = Document::create("a", "x", None, None);
        store.add_document(&doc).await.unwrap();
        engine.set_unavailable(true);
        store.remove_document(&doc.id).await;
        assert_eq!(store.get_document(&doc.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_converts_distance_to_similarity() {
        let (_engine, store) = store();
        let doc = Document::create("Rust", "ownership", None, None);
        store.add_document(&doc).await.unwrap();

        let results = store.search("Rust ownership", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document, doc);
        assert!((results[0].similarity_score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_reconstructs_from_metadata_on_cache_miss() {
        let (engine, store) = store();
        let doc = Document::create("Cars", "engine repair", Some("Auto"), Some("bob".into()));
        engine.add(&IndexDocument::from(&doc)).await.unwrap();

        let results = store.search("repair", 3).await;
        assert_eq!(results.len(), 1);
        let found = &results[0].document;
        assert_eq!(found.id, doc.id);
        assert_eq!(found.title, "Cars");
        assert_eq!(found.category, "Auto");
        assert_eq!(found.created_by.as_deref(), Some("bob"));
        assert_eq!(found.created_at.timestamp(), doc.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_search_fails_open() {
        let (engine, store) = store();
        store
            .add_document(&Document::create("a", "x", None, None))
            .await
            .unwrap();
        engine.set_unavailable(true);
        assert!(store.search("a", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_zero_top_k() {
        let (_engine, store) = store();
        store
            .add_document(&Document::create("a", "x", None, None))
            .await
            .unwrap();
        assert!(store.search("a", 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_all_documents_falls_back_to_cache() {
        let (engine, store) = store();
        let doc = Document::create("a", "x", None, None);
        store.add_document(&doc).await.unwrap();
        engine.set_unavailable(true);
        assert_eq!(store.all_documents().await.unwrap(), vec![doc]);
    }

    #[tokio::test]
    async fn test_all_documents_keeps_cached_timestamp() {
        let (_engine, store) = store();
        let doc = Document::create("a", "x", Some("Cat"), Some("amy".into()));
        store.add_document(&doc).await.unwrap();
        let listed = store.all_documents().await.unwrap();
        assert_eq!(listed, vec![doc]);
    }

    #[tokio::test]
    async fn test_all_documents_keeps_cached_creator() {
        let (_engine, store) = store();
        let doc = Document::create("a", "x", None, None);
        store.add_document(&doc).await.unwrap();

        let listed = store.all_documents().await.unwrap();
        assert_eq!(listed[0].created_by, None);
        assert_eq!(store.get_document(&doc.id).unwrap().unwrap().created_by, None);
    }

    #[tokio::test]
    async fn test_all_documents_evicts_unlisted_ids() {
        let (engine, store) = store();
        let kept = Document::create("kept", "x", None, None);
        let gone = Document::create("gone", "y", None, None);
        store.add_document(&kept).await.unwrap();
        store.add_document(&gone).await.unwrap();
        engine.remove(&gone.id).await.unwrap();

        let listed = store.all_documents().await.unwrap();
        assert_eq!(listed, vec![kept.clone()]);
        assert_eq!(store.get_document(&gone.id).unwrap(), None);
        assert_eq!(store.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_search_page_reports_raw_hit_count() {
        let (engine, store) = store();
        let doc = Document::create("a", "x", None, None);
        engine.add(&IndexDocument::from(&doc)).await.unwrap();
        let (results, raw) = store.search_page("a", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(raw, 1);

        engine.set_unavailable(true);
        assert_eq!(store.search_page("a", 5).await, (Vec::new(), 0));
    }

    #[tokio::test]
    async fn test_reload_populates_cache() {
        let (engine, store) = store();
        let doc = Document::create("a", "x", None, None);
        engine.add(&IndexDocument::from(&doc)).await.unwrap();
        assert_eq!(store.reload().await.unwrap(), 1);
        assert_eq!(store.get_document(&doc.id).unwrap().unwrap().title, "a");
    }

    #[tokio::test]
    async fn test_count_and_stats_degrade() {
        let (engine, store) = store();
        store
            .add_document(&Document::create("a", "x", None, None))
            .await
            .unwrap();
        assert_eq!(store.document_count().await, 1);
        assert_eq!(store.stats().await["total_documents"], 1);

        engine.set_unavailable(true);
        assert_eq!(store.document_count().await, 1);
        assert!(store.stats().await.get("error").is_some());
        assert!(!store.is_engine_healthy().await);
    }

    #[tokio::test]
    async fn test_clear_empties_engine_and_cache() {
        let (engine, store) = store();
        store
            .add_document(&Document::create("a", "x", None, None))
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert!(engine.is_empty());
        assert!(store.cache().is_empty());
        assert_eq!(store.document_count().await, 0);
    }
}
