//! Document lifecycle and semantic search.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use kb_core::config::SearchConfig;
use kb_core::error::Result;
use kb_core::types::{Document, KnowledgeBaseStats, SearchResult};
use kb_vector::{BatchAck, VectorStore};

/// Knowledge base operations shared by the API handlers and the importer.
pub struct KnowledgeBaseService {
    store: Arc<VectorStore>,
    search: SearchConfig,
}

impl KnowledgeBaseService {
    pub fn new(store: Arc<VectorStore>, search: SearchConfig) -> Self {
        Self { store, search }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Create and index a new document.
    ///
    /// Input is not validated here; callers reject blank titles and content.
    pub async fn add_document(
        &self,
        title: &str,
        content: &str,
        category: Option<&str>,
        created_by: Option<String>,
    ) -> Result<Document> {
        let doc = Document::create(title, content, category, created_by);
        self.store.add_document(&doc).await?;
        info!(id = %doc.id, category = %doc.category, "Document added");
        Ok(doc)
    }

    /// Index prepared documents in a single batch.
    pub async fn add_documents(&self, docs: &[Document]) -> Result<BatchAck> {
        self.store.add_documents(docs).await
    }

    /// Look a document up by id.
    ///
    /// Cache misses fall through to a full engine enumeration, which also
    /// repopulates the cache.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        if let Some(doc) = self.store.get_document(id)? {
            return Ok(Some(doc));
        }
        debug!(id, "Cache miss, enumerating engine documents");
        Ok(self
            .store
            .all_documents()
            .await?
            .into_iter()
            .find(|d| d.id == id))
    }

    pub async fn all_documents(&self) -> Result<Vec<Document>> {
        self.store.all_documents().await
    }

    /// Delete a document. Unknown ids are not an error.
    pub async fn delete_document(&self, id: &str) {
        self.store.remove_document(id).await;
        info!(id, "Document deleted");
    }

    /// Remove every document from the knowledge base.
    pub async fn delete_all(&self) -> Result<()> {
        self.store.clear().await?;
        info!("All documents deleted");
        Ok(())
    }

    /// Replace a document's title, content and category.
    ///
    /// Returns `Ok(None)` for unknown ids. The id and creator are kept and
    /// the timestamp is refreshed. If re-indexing fails, the previous version
    /// is restored on a best-effort basis and the original error returned.
    pub async fn update_document(
        &self,
        id: &str,
        title: &str,
        content: &str,
        category: Option<&str>,
    ) -> Result<Option<Document>> {
        let Some(previous) = self.get_document(id).await? else {
            return Ok(None);
        };

        self.store.remove_document(id).await;
        let updated = Document::new(
            id,
            title,
            content,
            category,
            Utc::now(),
            previous.created_by.clone(),
        );

        match self.store.add_document(&updated).await {
            Ok(()) => {
                info!(id, "Document updated");
                Ok(Some(updated))
            }
            Err(e) => {
                error!(id, error = %e, "Failed to index updated document, restoring previous version");
                match self.store.add_document(&previous).await {
                    Ok(()) => warn!(id, "Previous document version restored"),
                    Err(restore) => {
                        error!(id, error = %restore, "Failed to restore previous document version")
                    }
                }
                Err(e)
            }
        }
    }

    /// Unfiltered semantic search.
    pub async fn semantic_search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        self.store.search(query, max_results).await
    }

    /// Semantic search restricted to one category (case-insensitive).
    ///
    /// Filtering happens after retrieval, so candidates are over-fetched.
    /// While the page is under-filled and the engine keeps returning full
    /// pages, the fetch size doubles up to `max_fetch`.
    pub async fn semantic_search_in_category(
        &self,
        query: &str,
        max_results: usize,
        category: Option<&str>,
    ) -> Vec<SearchResult> {
        let wanted = match category.map(str::trim) {
            Some(c) if !c.is_empty() => c.to_lowercase(),
            _ => return self.semantic_search(query, max_results).await,
        };
        if max_results == 0 {
            return Vec::new();
        }

        let cap = self.search.max_fetch.max(max_results);
        let mut fetch = max_results
            .saturating_mul(self.search.overfetch_multiplier.max(1))
            .min(cap);

        loop {
            let (candidates, raw_hits) = self.store.search_page(query, fetch).await;
            let exhausted = raw_hits < fetch;
            let matched: Vec<SearchResult> = candidates
                .into_iter()
                .filter(|r| r.document.category.to_lowercase() == wanted)
                .take(max_results)
                .collect();

            if matched.len() >= max_results || exhausted || fetch >= cap {
                debug!(
                    category = %wanted,
                    fetched = fetch,
                    matched = matched.len(),
                    "Category search complete"
                );
                return matched;
            }
            fetch = fetch.saturating_mul(2).min(cap);
        }
    }

    /// Distinct non-blank categories, sorted.
    pub async fn categories(&self) -> Result<Vec<String>> {
        let set: BTreeSet<String> = self
            .all_documents()
            .await?
            .into_iter()
            .map(|d| d.category)
            .filter(|c| !c.trim().is_empty())
            .collect();
        Ok(set.into_iter().collect())
    }

    pub async fn stats(&self) -> KnowledgeBaseStats {
        KnowledgeBaseStats {
            document_count: self.store.document_count().await,
            embedding_dimension: self.store.embedding_dimension(),
        }
    }

    /// Raw engine statistics.
    pub async fn engine_stats(&self) -> serde_json::Value {
        self.store.stats().await
    }
}
