//! Local document cache keyed by document id.
//!
//! Serves detail lookups and acts as the fallback when the engine cannot be
//! reached. Thread-safe via an interior RwLock; clones share the same map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kb_core::error::{KbError, Result};
use kb_core::types::Document;

#[derive(Debug, Clone, Default)]
pub struct DocumentCache {
    entries: Arc<RwLock<HashMap<String, Document>>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| KbError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(entries.get(id).cloned())
    }

    /// Insert or replace a document.
    pub fn insert(&self, doc: Document) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| KbError::Storage(format!("Lock poisoned: {}", e)))?;
        entries.insert(doc.id.clone(), doc);
        Ok(())
    }

    /// Insert or replace several documents under a single write lock.
    pub fn insert_many(&self, docs: impl IntoIterator<Item = Document>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| KbError::Storage(format!("Lock poisoned: {}", e)))?;
        for doc in docs {
            entries.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    /// Remove a document, returning it if it was cached.
    pub fn remove(&self, id: &str) -> Result<Option<Document>> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| KbError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(entries.remove(id))
    }

    /// Replace the whole cache content.
    pub fn replace_all(&self, docs: impl IntoIterator<Item = Document>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| KbError::Storage(format!("Lock poisoned: {}", e)))?;
        *entries = docs.into_iter().map(|d| (d.id.clone(), d)).collect();
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.replace_all(std::iter::empty())
    }

    /// Snapshot of all cached documents, oldest first.
    pub fn values(&self) -> Result<Vec<Document>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| KbError::Storage(format!("Lock poisoned: {}", e)))?;
        let mut docs: Vec<Document> = entries.values().cloned().collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
