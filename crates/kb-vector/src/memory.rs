//! In-process vector engine for tests and offline development.
//!
//! Texts are embedded with deterministic hashed bag-of-words vectors
//! (L2-normalized), and search ranks by squared L2 distance, matching the
//! distance convention of the real engine (0.0 is identical, 4.0 is opposite).
//! Failure switches let callers exercise degraded paths.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use kb_core::error::{KbError, Result};

use crate::engine::{
    BatchAck, EngineDocument, EngineHit, EngineStats, HitMetadata, IndexDocument, VectorEngine,
};

#[derive(Debug, Clone)]
struct Entry {
    doc: IndexDocument,
    vector: Vec<f32>,
}

/// In-memory [`VectorEngine`] with brute-force search.
#[derive(Debug)]
pub struct InMemoryEngine {
    dimensions: usize,
    // Insertion order is preserved, like the engine's id list.
    entries: RwLock<Vec<Entry>>,
    unavailable: AtomicBool,
    failing_writes: AtomicUsize,
}

impl InMemoryEngine {
    /// Create an empty engine producing `dimensions`-wide vectors.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            entries: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Make every operation fail as if the engine were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `count` add or add-batch calls fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KbError::Engine("engine unavailable".to_string()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_available()?;
        let consumed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(KbError::Engine("injected write failure".to_string()));
        }
        Ok(())
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut vector {
                *val /= norm;
            }
        }
        vector
    }

    fn upsert(entries: &mut Vec<Entry>, entry: Entry) {
        match entries.iter_mut().find(|e| e.doc.id == entry.doc.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new(384)
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> KbError {
    KbError::Storage(format!("Lock poisoned: {}", e))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| ((*x - *y) as f64).powi(2))
        .sum()
}

#[async_trait]
impl VectorEngine for InMemoryEngine {
    async fn add(&self, doc: &IndexDocument) -> Result<()> {
        self.ensure_writable()?;
        let entry = Entry {
            vector: self.embed(&doc.text),
            doc: doc.clone(),
        };
        let mut entries = self.entries.write().map_err(poisoned)?;
        Self::upsert(&mut entries, entry);
        Ok(())
    }

    async fn add_batch(&self, docs: &[IndexDocument]) -> Result<BatchAck> {
        self.ensure_writable()?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        for doc in docs {
            let entry = Entry {
                vector: self.embed(&doc.text),
                doc: doc.clone(),
            };
            Self::upsert(&mut entries, entry);
        }
        Ok(BatchAck {
            added: docs.len() as u64,
            total_documents: entries.len() as u64,
        })
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.ensure_available()?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.retain(|e| e.doc.id != id);
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<EngineHit>> {
        self.ensure_available()?;
        let query_vec = self.embed(query);
        let entries = self.entries.read().map_err(poisoned)?;

        let mut scored: Vec<(f64, &Entry)> = entries
            .iter()
            .map(|e| (squared_l2(&query_vec, &e.vector), e))
            .collect();
        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| EngineHit {
                id: e.doc.id.clone(),
                score,
                metadata: Some(HitMetadata {
                    title: Some(e.doc.metadata.title.clone()),
                    category: Some(e.doc.metadata.category.clone()),
                    content: Some(e.doc.metadata.content.clone()),
                    created_at: Some(e.doc.metadata.created_at.clone()),
                    created_by: Some(e.doc.metadata.created_by.clone()),
                }),
            })
            .collect())
    }

    async fn documents(&self) -> Result<Vec<EngineDocument>> {
        self.ensure_available()?;
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .iter()
            .map(|e| EngineDocument {
                id: e.doc.id.clone(),
                title: Some(e.doc.metadata.title.clone()),
                content: Some(e.doc.metadata.content.clone()),
                category: Some(e.doc.metadata.category.clone()),
                created_by: Some(e.doc.metadata.created_by.clone()),
            })
            .collect())
    }

    async fn stats(&self) -> Result<EngineStats> {
        self.ensure_available()?;
        Ok(EngineStats {
            total_documents: self.len() as u64,
            embedding_dim: Some(self.dimensions),
            extra: serde_json::Map::new(),
        })
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_available()?;
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn health(&self) -> Result<bool> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::Document;

    fn index_doc(title: &str, content: &str, category: &str) -> IndexDocument {
        IndexDocument::from(&Document::create(title, content, Some(category), None))
    }

    #[test]
    fn test_embed_is_deterministic_and_normalized() {
        let engine = InMemoryEngine::new(64);
        let a = engine.embed("Rust ownership");
        let b = engine.embed("rust OWNERSHIP");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_embed_empty_text_is_zero_vector() {
        let engine = InMemoryEngine::new(16);
        assert!(engine.embed("  ").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_search_ranks_overlap_first() {
        let engine = InMemoryEngine::new(256);
        engine
            .add(&index_doc("Cooking", "pasta sauce tomato", "Food"))
            .await
            .unwrap();
        let rust = index_doc("Rust", "ownership borrowing lifetimes", "Tech");
        engine.add(&rust).await.unwrap();

        let hits = engine.search("rust ownership", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, rust.id);
        assert!(hits[0].score <= hits[1].score);
    }

    #[tokio::test]
    async fn test_add_same_id_replaces() {
        let engine = InMemoryEngine::default();
        let mut doc = index_doc("A", "one", "X");
        engine.add(&doc).await.unwrap();
        doc.metadata.title = "B".to_string();
        engine.add(&doc).await.unwrap();
        assert_eq!(engine.len(), 1);
        let docs = engine.documents().await.unwrap();
        assert_eq!(docs[0].title.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_remove_unknown_is_ok() {
        let engine = InMemoryEngine::default();
        engine.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_and_clear() {
        let engine = InMemoryEngine::default();
        let ack = engine
            .add_batch(&[index_doc("A", "a", "X"), index_doc("B", "b", "Y")])
            .await
            .unwrap();
        assert_eq!(ack.added, 2);
        assert_eq!(ack.total_documents, 2);
        assert_eq!(engine.stats().await.unwrap().total_documents, 2);

        engine.clear().await.unwrap();
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_fails_everything_but_health() {
        let engine = InMemoryEngine::default();
        engine.set_unavailable(true);
        assert!(engine.search("q", 3).await.is_err());
        assert!(engine.documents().await.is_err());
        assert!(engine.add(&index_doc("A", "a", "X")).await.is_err());
        assert!(!engine.health().await.unwrap());

        engine.set_unavailable(false);
        assert!(engine.health().await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_next_writes_counts_down() {
        let engine = InMemoryEngine::default();
        engine.fail_next_writes(1);
        assert!(engine.add(&index_doc("A", "a", "X")).await.is_err());
        engine.add(&index_doc("A", "a", "X")).await.unwrap();
        assert_eq!(engine.len(), 1);
    }
}
