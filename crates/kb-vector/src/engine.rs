//! Vector engine boundary.
//!
//! The engine owns embedding generation, indexing and nearest-neighbour
//! search. This crate only speaks its wire contract, modelled here as the
//! object-safe [`VectorEngine`] trait plus the JSON payloads it exchanges.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kb_core::error::Result;
use kb_core::types::Document;

/// Metadata stored alongside each indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub title: String,
    pub category: String,
    pub content: String,
    pub created_at: String,
    pub created_by: String,
}

/// Payload for `/index/add` and one element of `/index/add-batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    pub metadata: IndexMetadata,
}

impl From<&Document> for IndexDocument {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            text: doc.text_for_embedding(),
            metadata: IndexMetadata {
                title: doc.title.clone(),
                category: doc.category.clone(),
                content: doc.content.clone(),
                created_at: doc.created_at.to_rfc3339(),
                created_by: doc.creator_or_system().to_string(),
            },
        }
    }
}

/// Acknowledgement returned by `/index/add-batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAck {
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub total_documents: u64,
}

/// Metadata echoed back with a search hit. Every field is optional because
/// the engine returns whatever was stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HitMetadata {
    pub title: Option<String>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<String>,
    pub created_by: Option<String>,
}

/// One nearest-neighbour hit. `score` is a distance: lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHit {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<HitMetadata>,
    pub score: f64,
}

/// One entry of `/index/documents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDocument {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Response of `/index/stats`. Fields beyond the document count are kept
/// verbatim so they can be passed through to API callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    #[serde(default)]
    pub total_documents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Operations offered by an external vector engine.
///
/// Implementations map transport and protocol failures to
/// [`kb_core::KbError::Engine`]. `remove` must succeed for unknown ids.
#[async_trait]
pub trait VectorEngine: Send + Sync {
    /// Index a single document.
    async fn add(&self, doc: &IndexDocument) -> Result<()>;

    /// Index many documents in one round trip.
    async fn add_batch(&self, docs: &[IndexDocument]) -> Result<BatchAck>;

    /// Drop a document from the index.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Return up to `top_k` hits ordered by ascending distance.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<EngineHit>>;

    /// Enumerate every indexed document.
    async fn documents(&self) -> Result<Vec<EngineDocument>>;

    async fn stats(&self) -> Result<EngineStats>;

    /// Remove every document from the index.
    async fn clear(&self) -> Result<()>;

    /// Liveness probe.
    async fn health(&self) -> Result<bool>;
}
